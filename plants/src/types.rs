use serde::Serialize;
use std::fmt;

pub type PlantId = String;

/// Display name used when the catalog has no name for an authorized plant.
pub const UNKNOWN_PLANT_NAME: &str = "(unknown)";

/// The verified identity of the caller, taken from the token's `sub` claim.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Subject(String);

impl Subject {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Subject(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A row of the plant catalog. `plant_name` is `None` when the row carries no
/// usable name.
#[derive(Clone, Debug, PartialEq)]
pub struct PlantRecord {
    pub plant_id: PlantId,
    pub plant_name: Option<String>,
}

impl PlantRecord {
    pub fn new<I, N>(plant_id: I, plant_name: N) -> Self
    where
        I: Into<String>,
        N: Into<String>,
    {
        let plant_name = plant_name.into();
        PlantRecord {
            plant_id: plant_id.into(),
            plant_name: (!plant_name.is_empty()).then_some(plant_name),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedPlant {
    pub plant_id: PlantId,
    pub plant_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlantsResponse {
    pub plants: Vec<ResolvedPlant>,
}
