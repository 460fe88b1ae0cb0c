//! Nutrient exclusion engine.
//!
//! Holds the session exclusion list (ordered, no repeated ids), mirrors
//! changes to the saved exclusions of the current user, and filters food
//! search results at food granularity.

use crate::store::Store;
use crate::{FdcId, FoodNutrientHit, FoodRow, NutrientNbr, NutrientRow, Result};
use serde::Serialize;
use std::collections::HashSet;

/// One excluded nutrient as shown in the exclusion list
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ExclusionEntry {
    pub nutrient_id: NutrientNbr,
    pub name: String,
}

impl ExclusionEntry {
    pub fn label(&self) -> String {
        format!("Exclude: {}", self.name)
    }
}

/// Exclusions active in the current interaction, in insertion order
#[derive(Clone, Debug, Default)]
pub struct SessionExclusions {
    entries: Vec<ExclusionEntry>,
}

/// A user name counts only when it has non-blank content
fn present_user(user: Option<&str>) -> Option<&str> {
    user.map(str::trim).filter(|u| !u.is_empty())
}

impl SessionExclusions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ExclusionEntry] {
        &self.entries
    }

    /// Excluded nutrient ids in insertion order
    pub fn ids(&self) -> Vec<NutrientNbr> {
        self.entries.iter().map(|e| e.nutrient_id).collect()
    }

    pub fn contains(&self, nutrient_id: NutrientNbr) -> bool {
        self.entries.iter().any(|e| e.nutrient_id == nutrient_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exclude the nutrient of a clicked row
    ///
    /// Returns `false` without touching the store when the nutrient is
    /// already listed. Otherwise appends it and, if a user is present,
    /// saves it for that user.
    pub fn add(&mut self, store: &Store, user: Option<&str>, row: &NutrientRow) -> Result<bool> {
        if self.contains(row.nutrient_nbr) {
            tracing::debug!("Nutrient {} already excluded", row.nutrient_nbr);
            return Ok(false);
        }

        if let Some(user) = present_user(user) {
            store.save_user_exclusion(user, row.nutrient_nbr)?;
        }
        self.entries.push(ExclusionEntry {
            nutrient_id: row.nutrient_nbr,
            name: row.name.clone(),
        });
        tracing::info!("Excluding nutrient {} ({})", row.nutrient_nbr, row.name);
        Ok(true)
    }

    /// Replace the whole list with the exclusions saved for `user`
    ///
    /// Entries added before the user name was known are dropped, not merged.
    pub fn load_for_user(&mut self, store: &Store, user: &str) -> Result<()> {
        let ids = store.load_user_exclusions(user)?;
        let names = store.nutrient_names_by_id(&ids)?;

        self.entries = ids
            .into_iter()
            .map(|id| {
                let name = names.get(&id).cloned().unwrap_or_else(|| {
                    tracing::warn!("Saved exclusion {} has no nutrient row", id);
                    format!("nutrient {}", id)
                });
                ExclusionEntry {
                    nutrient_id: id,
                    name,
                }
            })
            .collect();

        tracing::info!(
            "Loaded {} saved exclusions for user {:?}",
            self.entries.len(),
            user
        );
        Ok(())
    }

    /// Remove an entry, deleting the saved rows too when a user is present
    pub fn remove(
        &mut self,
        store: &Store,
        user: Option<&str>,
        nutrient_id: NutrientNbr,
    ) -> Result<bool> {
        let before = self.entries.len();
        self.entries.retain(|e| e.nutrient_id != nutrient_id);
        let removed = self.entries.len() != before;

        if let Some(user) = present_user(user) {
            store.delete_user_exclusion(user, nutrient_id)?;
        }
        Ok(removed)
    }
}

/// Drop every food that has a fact for an excluded nutrient
///
/// `hits` is the raw food x food_nutrient join. A food is removed with all
/// of its rows as soon as one of them names an excluded nutrient. The
/// survivors are deduplicated by (fdc_id, data_type, description) keeping
/// the first occurrence.
pub fn apply_exclusions(
    hits: Vec<FoodNutrientHit>,
    excluded: &HashSet<NutrientNbr>,
) -> Vec<FoodRow> {
    let excluded_foods: HashSet<FdcId> = hits
        .iter()
        .filter(|hit| hit.nutrient_id.is_some_and(|id| excluded.contains(&id)))
        .map(|hit| hit.food.fdc_id)
        .collect();

    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|hit| !excluded_foods.contains(&hit.food.fdc_id))
        .map(|hit| hit.food)
        .filter(|food| {
            seen.insert((
                food.fdc_id,
                food.data_type.clone(),
                food.description.clone(),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Food, Nutrient};

    fn row(fdc_id: FdcId, description: &str) -> FoodRow {
        FoodRow {
            fdc_id,
            data_type: "branded_food".into(),
            description: description.into(),
            publication_date: None,
        }
    }

    fn hit(fdc_id: FdcId, description: &str, nutrient_id: Option<NutrientNbr>) -> FoodNutrientHit {
        FoodNutrientHit {
            food: row(fdc_id, description),
            nutrient_id,
        }
    }

    fn nutrient(nutrient_nbr: NutrientNbr, name: &str) -> Nutrient {
        Nutrient {
            id: nutrient_nbr,
            name: name.into(),
            unit_name: "G".into(),
            nutrient_nbr,
            rank: None,
        }
    }

    fn seeded_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.init_schema().unwrap();
        store
            .append_batch(
                &[Food {
                    fdc_id: 1,
                    description: "Apple".into(),
                    data_type: "branded_food".into(),
                    publication_date: None,
                    food_code: None,
                }],
                &[nutrient(203, "Protein"), nutrient(204, "Total lipid (fat)")],
                &[],
            )
            .unwrap();
        store
    }

    #[test]
    fn test_apply_exclusions_removes_whole_food() {
        let hits = vec![
            hit(1, "Apple", Some(10)),
            hit(1, "Apple", Some(20)),
            hit(2, "Banana", Some(10)),
            hit(3, "Cherry", None),
        ];
        let excluded: HashSet<_> = [20].into_iter().collect();

        let rows = apply_exclusions(hits, &excluded);
        let ids: Vec<_> = rows.iter().map(|r| r.fdc_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_apply_exclusions_dedups_in_first_seen_order() {
        let hits = vec![
            hit(5, "Egg", Some(1)),
            hit(4, "Bread", Some(1)),
            hit(5, "Egg", Some(2)),
            hit(4, "Bread", Some(3)),
        ];
        let rows = apply_exclusions(hits, &HashSet::new());
        let ids: Vec<_> = rows.iter().map(|r| r.fdc_id).collect();
        assert_eq!(ids, vec![5, 4]);
    }

    #[test]
    fn test_add_is_idempotent() {
        let store = seeded_store();
        let mut session = SessionExclusions::new();
        let protein = nutrient(203, "Protein");

        assert!(session.add(&store, Some("alice"), &protein).unwrap());
        assert!(!session.add(&store, Some("alice"), &protein).unwrap());

        assert_eq!(session.ids(), vec![203]);
        assert_eq!(store.load_user_exclusions("alice").unwrap(), vec![203]);
    }

    #[test]
    fn test_add_without_user_does_not_persist() {
        let store = seeded_store();
        let mut session = SessionExclusions::new();

        assert!(session.add(&store, None, &nutrient(203, "Protein")).unwrap());
        assert!(session.add(&store, Some("  "), &nutrient(204, "Fat")).unwrap());

        assert_eq!(session.ids(), vec![203, 204]);
        assert!(store.load_user_exclusions("  ").unwrap().is_empty());
        let conn = store.conn().unwrap();
        let saved: i64 = conn
            .query_row("SELECT count(*) FROM saved_nutrients", [], |r| r.get(0))
            .unwrap();
        assert_eq!(saved, 0);
    }

    #[test]
    fn test_add_keeps_insertion_order() {
        let store = seeded_store();
        let mut session = SessionExclusions::new();
        for (nbr, name) in [(300, "Zinc"), (100, "Alpha"), (200, "Mid")] {
            session.add(&store, None, &nutrient(nbr, name)).unwrap();
        }
        assert_eq!(session.ids(), vec![300, 100, 200]);
        assert_eq!(session.entries()[0].label(), "Exclude: Zinc");
    }

    #[test]
    fn test_load_for_user_replaces_session() {
        let store = seeded_store();
        store.save_user_exclusion("alice", 204).unwrap();
        store.save_user_exclusion("alice", 204).unwrap();

        let mut session = SessionExclusions::new();
        session.add(&store, None, &nutrient(203, "Protein")).unwrap();

        session.load_for_user(&store, "alice").unwrap();
        assert_eq!(
            session.entries(),
            &[ExclusionEntry {
                nutrient_id: 204,
                name: "Total lipid (fat)".into(),
            }]
        );
    }

    #[test]
    fn test_load_for_unknown_user_clears_session() {
        let store = seeded_store();
        let mut session = SessionExclusions::new();
        session.add(&store, None, &nutrient(203, "Protein")).unwrap();

        session.load_for_user(&store, "nobody").unwrap();
        assert!(session.is_empty());
    }

    #[test]
    fn test_load_for_user_falls_back_for_missing_nutrient() {
        let store = seeded_store();
        store.save_user_exclusion("alice", 999).unwrap();

        let mut session = SessionExclusions::new();
        session.load_for_user(&store, "alice").unwrap();
        assert_eq!(session.entries()[0].name, "nutrient 999");
    }

    #[test]
    fn test_remove_deletes_saved_rows() {
        let store = seeded_store();
        let mut session = SessionExclusions::new();
        session.add(&store, Some("alice"), &nutrient(203, "Protein")).unwrap();
        session.add(&store, Some("alice"), &nutrient(204, "Fat")).unwrap();

        assert!(session.remove(&store, Some("alice"), 203).unwrap());
        assert!(!session.remove(&store, Some("alice"), 203).unwrap());

        assert_eq!(session.ids(), vec![204]);
        assert_eq!(store.load_user_exclusions("alice").unwrap(), vec![204]);
        assert_eq!(session.len(), 1);
    }
}
