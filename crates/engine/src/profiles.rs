//! Built-in import targets.

use serde::{Deserialize, Serialize};

use cabledesk_core::{ColumnMap, ColumnSpec, CoreError, ReferenceColumn};

pub const CABLE_TYPES: &str = "cable_types";
pub const CABLES: &str = "cables";
pub const MATERIAL_TRAYS: &str = "material_trays";
pub const MATERIAL_SUPPORTS: &str = "material_supports";

const NAME_MAX: usize = 120;
const CABLE_ID_MAX: usize = 64;

/// A collection name plus the column map its sheets are read with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionProfile {
    pub collection: String,
    pub columns: ColumnMap,
}

impl CollectionProfile {
    pub fn new(collection: &str, columns: ColumnMap) -> Self {
        Self {
            collection: collection.to_string(),
            columns,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.collection.trim().is_empty() {
            return Err(CoreError::InvalidColumnMap(
                "profile has an empty collection name".to_string(),
            ));
        }
        self.columns.validate()
    }
}

pub fn cable_types() -> CollectionProfile {
    CollectionProfile::new(
        CABLE_TYPES,
        ColumnMap::new(ColumnSpec::text("Name", "name").max_length(NAME_MAX))
            .column(ColumnSpec::number("Conductors", "conductors").non_negative())
            .column(ColumnSpec::number("Cross Section", "cross_section").non_negative())
            .column(ColumnSpec::number("Outer Diameter", "outer_diameter").non_negative())
            .column(ColumnSpec::number("Weight", "weight").non_negative())
            .column(ColumnSpec::text("Description", "description")),
    )
}

pub fn cables() -> CollectionProfile {
    CollectionProfile::new(
        CABLES,
        ColumnMap::new(ColumnSpec::text("Cable Id", "cable_id").max_length(CABLE_ID_MAX))
            .reference(ReferenceColumn::new("Type", CABLE_TYPES).required())
            .column(ColumnSpec::text("From", "from"))
            .column(ColumnSpec::text("To", "to"))
            .column(ColumnSpec::number("Length", "length").non_negative())
            .column(ColumnSpec::text("Routing", "routing"))
            .column(ColumnSpec::date("Installed On", "installed_on"))
            .column(ColumnSpec::text("Notes", "notes")),
    )
}

pub fn material_trays() -> CollectionProfile {
    CollectionProfile::new(
        MATERIAL_TRAYS,
        ColumnMap::new(ColumnSpec::text("Type", "type").max_length(NAME_MAX))
            .column(ColumnSpec::text("Manufacturer", "manufacturer"))
            .column(ColumnSpec::text("Product Line", "product_line"))
            .column(ColumnSpec::number("Width", "width").non_negative())
            .column(ColumnSpec::number("Height", "height").non_negative())
            .column(ColumnSpec::number("Weight", "weight").non_negative()),
    )
}

pub fn material_supports() -> CollectionProfile {
    CollectionProfile::new(
        MATERIAL_SUPPORTS,
        ColumnMap::new(ColumnSpec::text("Type", "type").max_length(NAME_MAX))
            .reference(ReferenceColumn::new("Tray Type", MATERIAL_TRAYS))
            .column(ColumnSpec::text("Manufacturer", "manufacturer"))
            .column(ColumnSpec::number("Width", "width").non_negative())
            .column(ColumnSpec::number("Height", "height").non_negative())
            .column(ColumnSpec::number("Length", "length").non_negative())
            .column(ColumnSpec::number("Weight", "weight").non_negative()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_profiles_are_valid() {
        for profile in [cable_types(), cables(), material_trays(), material_supports()] {
            assert!(profile.validate().is_ok(), "{} is invalid", profile.collection);
        }
    }

    #[test]
    fn empty_collection_rejected() {
        let mut profile = cable_types();
        profile.collection = "  ".to_string();
        assert!(profile.validate().is_err());
    }
}
