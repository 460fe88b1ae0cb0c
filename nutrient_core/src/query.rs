//! Parameterized queries against the schema store.
//!
//! Every user-supplied value is bound, never formatted into SQL.

use crate::exclusion::apply_exclusions;
use crate::store::Store;
use crate::{
    BreakdownSlice, BubblePoint, FdcId, FoodNutrientHit, FoodRow, Nutrient, NutrientNbr,
    NutrientRow, Result, TableCounts,
};
use rusqlite::{params, params_from_iter, Row};
use std::collections::{HashMap, HashSet};

/// Maximum rows returned by the food and nutrient searches
pub const SEARCH_LIMIT: usize = 20;

fn food_row(row: &Row<'_>) -> rusqlite::Result<FoodRow> {
    Ok(FoodRow {
        fdc_id: row.get(0)?,
        data_type: row.get(1)?,
        description: row.get(2)?,
        publication_date: row.get(3)?,
    })
}

fn nutrient_row(row: &Row<'_>) -> rusqlite::Result<Nutrient> {
    Ok(Nutrient {
        id: row.get(0)?,
        name: row.get(1)?,
        unit_name: row.get(2)?,
        nutrient_nbr: row.get(3)?,
        rank: row.get(4)?,
    })
}

impl Store {
    /// Search foods whose description contains `term`, ignoring case
    ///
    /// With a non-empty `excluded` list, any food having a fact for one of
    /// those nutrients is dropped entirely before the 20-row cap applies.
    pub fn search_food_by_description(
        &self,
        term: &str,
        excluded: &[NutrientNbr],
    ) -> Result<Vec<FoodRow>> {
        let needle = term.to_lowercase();
        let conn = self.conn()?;

        if excluded.is_empty() {
            let mut stmt = conn.prepare(
                "SELECT fdc_id, data_type, description, publication_date
                 FROM food
                 WHERE instr(fold_case(description), ?1) > 0
                 ORDER BY rowid
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![needle, SEARCH_LIMIT as i64], food_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            tracing::debug!("Food search {:?} matched {} rows", term, rows.len());
            return Ok(rows);
        }

        let mut stmt = conn.prepare(
            "SELECT f.fdc_id, f.data_type, f.description, f.publication_date, fn.nutrient_id
             FROM food AS f
             LEFT JOIN food_nutrient AS fn ON fn.fdc_id = f.fdc_id
             WHERE instr(fold_case(f.description), ?1) > 0
             ORDER BY f.rowid",
        )?;
        let hits = stmt
            .query_map(params![needle], |row| {
                Ok(FoodNutrientHit {
                    food: food_row(row)?,
                    nutrient_id: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let excluded: HashSet<NutrientNbr> = excluded.iter().copied().collect();
        let mut rows = apply_exclusions(hits, &excluded);
        rows.truncate(SEARCH_LIMIT);
        tracing::debug!(
            "Food search {:?} excluding {} nutrients kept {} rows",
            term,
            excluded.len(),
            rows.len()
        );
        Ok(rows)
    }

    /// Search nutrients whose name contains `term`, ignoring case
    pub fn search_nutrient_by_name(&self, term: &str) -> Result<Vec<NutrientRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, unit_name, nutrient_nbr, rank
             FROM nutrient
             WHERE instr(fold_case(name), ?1) > 0
             ORDER BY rowid
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![term.to_lowercase(), SEARCH_LIMIT as i64], nutrient_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Look up one nutrient by its number
    pub fn nutrient_by_nbr(&self, nutrient_nbr: NutrientNbr) -> Result<Option<Nutrient>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, unit_name, nutrient_nbr, rank FROM nutrient WHERE nutrient_nbr = ?1",
        )?;
        let mut rows = stmt.query_map(params![nutrient_nbr], nutrient_row)?;
        Ok(rows.next().transpose()?)
    }

    /// Name/amount pairs for one food, as shown in the pie chart
    ///
    /// Rows are grouped by (name, amount): two facts with the same nutrient
    /// name and the same amount collapse into a single slice.
    pub fn nutrient_breakdown_for_food(&self, fdc_id: FdcId) -> Result<Vec<BreakdownSlice>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT n.name, fn.amount
             FROM food AS f
             JOIN food_nutrient AS fn ON fn.fdc_id = f.fdc_id
             JOIN nutrient AS n ON n.nutrient_nbr = fn.nutrient_id
             WHERE f.fdc_id = ?1
             GROUP BY n.name, fn.amount
             ORDER BY n.name, fn.amount",
        )?;
        let slices = stmt
            .query_map(params![fdc_id], |row| {
                Ok(BreakdownSlice {
                    name: row.get(0)?,
                    amount: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(slices)
    }

    /// Fact counts per nutrient, keyed by the first letter of its name
    pub fn bubble_summary(&self) -> Result<Vec<BubblePoint>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT substr(n.name, 1, 1) AS lbl, n.name, n.unit_name, count(*)
             FROM food_nutrient AS fn
             JOIN nutrient AS n ON n.nutrient_nbr = fn.nutrient_id
             GROUP BY lbl, n.name, n.unit_name
             ORDER BY lbl, n.name",
        )?;
        let points = stmt
            .query_map([], |row| {
                Ok(BubblePoint {
                    label: row.get(0)?,
                    name: row.get(1)?,
                    unit_name: row.get(2)?,
                    count: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(points)
    }

    /// Record that `user` excludes a nutrient
    ///
    /// No uniqueness check: saving twice stores two rows.
    pub fn save_user_exclusion(&self, user: &str, nutrient_id: NutrientNbr) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO saved_nutrients (name, nutrient_id) VALUES (?1, ?2)",
            params![user, nutrient_id],
        )?;
        tracing::debug!("Saved exclusion {} for user {:?}", nutrient_id, user);
        Ok(())
    }

    /// Distinct nutrient ids saved for `user`, in first-saved order
    pub fn load_user_exclusions(&self, user: &str) -> Result<Vec<NutrientNbr>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT nutrient_id
             FROM saved_nutrients
             WHERE name = ?1
             GROUP BY nutrient_id
             ORDER BY min(rowid)",
        )?;
        let ids = stmt
            .query_map(params![user], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<NutrientNbr>>>()?;
        Ok(ids)
    }

    /// Delete every saved row for (`user`, `nutrient_id`)
    pub fn delete_user_exclusion(&self, user: &str, nutrient_id: NutrientNbr) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM saved_nutrients WHERE name = ?1 AND nutrient_id = ?2",
            params![user, nutrient_id],
        )?;
        tracing::debug!(
            "Deleted {} saved rows of exclusion {} for user {:?}",
            deleted,
            nutrient_id,
            user
        );
        Ok(deleted)
    }

    /// Display names for the given nutrient ids
    ///
    /// An empty id list returns an empty map without touching the database.
    pub fn nutrient_names_by_id(
        &self,
        nutrient_ids: &[NutrientNbr],
    ) -> Result<HashMap<NutrientNbr, String>> {
        if nutrient_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let unique: Vec<NutrientNbr> = {
            let mut seen = HashSet::new();
            nutrient_ids
                .iter()
                .copied()
                .filter(|id| seen.insert(*id))
                .collect()
        };
        let placeholders = vec!["?"; unique.len()].join(", ");
        let sql = format!(
            "SELECT nutrient_nbr, name FROM nutrient WHERE nutrient_nbr IN ({})",
            placeholders
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let names = stmt
            .query_map(params_from_iter(unique.iter()), |row| {
                Ok((row.get::<_, NutrientNbr>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(names)
    }

    /// Row counts of the food, nutrient and food_nutrient tables
    pub fn table_counts(&self) -> Result<TableCounts> {
        let conn = self.conn()?;
        let count = |table: &str| -> rusqlite::Result<usize> {
            let n: i64 =
                conn.query_row(&format!("SELECT count(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(TableCounts {
            foods: count("food")?,
            nutrients: count("nutrient")?,
            facts: count("food_nutrient")?,
        })
    }
}
