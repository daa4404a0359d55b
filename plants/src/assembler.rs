use crate::metrics_defs::UNRESOLVED_PLANT_NAMES;
use crate::types::{PlantId, ResolvedPlant, UNKNOWN_PLANT_NAME};
use shared::counter;
use std::collections::HashMap;

/// Builds the response list in the order of `ordered_ids`.
///
/// Every id is kept. Ids without a catalog name get [`UNKNOWN_PLANT_NAME`] so
/// an authorized plant never disappears from the list because its catalog row
/// is missing.
pub fn assemble(ordered_ids: &[PlantId], names: &HashMap<PlantId, String>) -> Vec<ResolvedPlant> {
    let mut unresolved = 0u64;

    let plants = ordered_ids
        .iter()
        .map(|plant_id| {
            let plant_name = match names.get(plant_id) {
                Some(name) => name.clone(),
                None => {
                    unresolved += 1;
                    UNKNOWN_PLANT_NAME.to_string()
                }
            };
            ResolvedPlant {
                plant_id: plant_id.clone(),
                plant_name,
            }
        })
        .collect();

    if unresolved > 0 {
        counter!(UNRESOLVED_PLANT_NAMES).increment(unresolved);
    }

    plants
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plant(id: &str, name: &str) -> ResolvedPlant {
        ResolvedPlant {
            plant_id: id.into(),
            plant_name: name.into(),
        }
    }

    #[test]
    fn test_missing_names_get_sentinel() {
        let ids = vec!["p3".to_string(), "p1".to_string(), "p2".to_string()];
        let names = HashMap::from([
            ("p1".to_string(), "Alpha".to_string()),
            ("p2".to_string(), "Beta".to_string()),
        ]);

        assert_eq!(
            assemble(&ids, &names),
            vec![
                plant("p3", UNKNOWN_PLANT_NAME),
                plant("p1", "Alpha"),
                plant("p2", "Beta"),
            ]
        );
    }

    #[test]
    fn test_order_follows_ids_not_names() {
        let ids = vec!["b".to_string(), "a".to_string(), "c".to_string()];
        let names = HashMap::from([
            ("c".to_string(), "C".to_string()),
            ("a".to_string(), "A".to_string()),
            ("b".to_string(), "B".to_string()),
        ]);

        let ordered: Vec<_> = assemble(&ids, &names)
            .into_iter()
            .map(|p| p.plant_id)
            .collect();
        assert_eq!(ordered, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_names_for_unrequested_ids_are_ignored() {
        let ids = vec!["p1".to_string()];
        let names = HashMap::from([
            ("p1".to_string(), "Alpha".to_string()),
            ("p9".to_string(), "Stray".to_string()),
        ]);

        assert_eq!(assemble(&ids, &names), vec![plant("p1", "Alpha")]);
    }

    #[test]
    fn test_empty() {
        assert!(assemble(&[], &HashMap::new()).is_empty());
    }
}
