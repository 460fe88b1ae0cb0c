//! Bulk import of FoodData Central CSV exports.
//!
//! Loads `food.csv`, `nutrient.csv` and `food_nutrient.csv` from one
//! directory, replacing the existing food tables. Saved user exclusions
//! are left alone.

use crate::ingest::normalize_publication_date;
use crate::store::{self, Store, DROP_FOOD_TABLES, FOOD_TABLES, INDEXES};
use crate::{Error, Food, FoodNutrient, Nutrient, NutrientNbr, Result};
use rusqlite::{Connection, Transaction};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const FOOD_CSV: &str = "food.csv";
pub const NUTRIENT_CSV: &str = "nutrient.csv";
pub const FOOD_NUTRIENT_CSV: &str = "food_nutrient.csv";

/// Row counts loaded by [`load_csv_dir`]
#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub foods: usize,
    pub nutrients: usize,
    pub facts: usize,
    /// Rows dropped because a required value was missing
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct FoodRecord {
    fdc_id: i64,
    #[serde(default)]
    data_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    publication_date: Option<String>,
    #[serde(default)]
    food_code: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct NutrientRecord {
    id: i64,
    name: String,
    #[serde(default)]
    unit_name: Option<String>,
    #[serde(default)]
    nutrient_nbr: Option<f64>,
    #[serde(default)]
    rank: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FoodNutrientRecord {
    fdc_id: i64,
    nutrient_id: i64,
    #[serde(default)]
    amount: Option<f64>,
}

/// Exports write some integer columns as `203.0`
fn whole_number(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0).then_some(value as i64)
}

impl From<FoodRecord> for Food {
    fn from(record: FoodRecord) -> Self {
        Food {
            fdc_id: record.fdc_id,
            description: record.description.unwrap_or_default(),
            data_type: record.data_type.unwrap_or_default(),
            publication_date: record
                .publication_date
                .as_deref()
                .and_then(normalize_publication_date),
            food_code: record.food_code.and_then(whole_number),
        }
    }
}

impl NutrientRecord {
    fn into_nutrient(self) -> Option<Nutrient> {
        let nutrient_nbr = self.nutrient_nbr.and_then(whole_number)?;
        Some(Nutrient {
            id: self.id,
            name: self.name,
            unit_name: self.unit_name.unwrap_or_default(),
            nutrient_nbr,
            rank: self.rank,
        })
    }
}

/// Load the three CSV files under `dir` into the store
///
/// Tables are dropped and recreated, rows are committed in transactions
/// of `batch_size`, and the search indexes are built last.
///
/// `food_nutrient.csv` references nutrients by their `id` column, as the
/// FoodData Central exports do; those references are rewritten to nutrient
/// numbers. Ids missing from `nutrient.csv` are kept as written.
pub fn load_csv_dir(store: &Store, dir: &Path, batch_size: usize) -> Result<ImportSummary> {
    if batch_size == 0 {
        return Err(Error::Config("batch size must be at least 1".into()));
    }
    for name in [FOOD_CSV, NUTRIENT_CSV, FOOD_NUTRIENT_CSV] {
        let path = dir.join(name);
        if !path.exists() {
            return Err(Error::Ingest(format!("Missing {}", path.display())));
        }
    }

    let mut conn = store.conn()?;
    conn.execute_batch(DROP_FOOD_TABLES)?;
    conn.execute_batch(FOOD_TABLES)?;
    tracing::info!("Recreated food tables, loading CSV from {:?}", dir);

    let mut summary = ImportSummary::default();

    summary.foods = load_in_batches::<FoodRecord, _>(
        &mut conn,
        &dir.join(FOOD_CSV),
        batch_size,
        |tx, records| {
            let foods: Vec<Food> = records.into_iter().map(Food::from).collect();
            store::insert_foods(tx, &foods)
        },
    )?;
    tracing::info!("Loaded {} foods", summary.foods);

    let mut id_to_nbr: HashMap<i64, NutrientNbr> = HashMap::new();
    let mut skipped_nutrients = 0;
    summary.nutrients = load_in_batches::<NutrientRecord, _>(
        &mut conn,
        &dir.join(NUTRIENT_CSV),
        batch_size,
        |tx, records| {
            let mut nutrients = Vec::with_capacity(records.len());
            for record in records {
                let id = record.id;
                match record.into_nutrient() {
                    Some(nutrient) => {
                        id_to_nbr.insert(id, nutrient.nutrient_nbr);
                        nutrients.push(nutrient);
                    }
                    None => skipped_nutrients += 1,
                }
            }
            store::insert_nutrients(tx, &nutrients)
        },
    )?;
    if skipped_nutrients > 0 {
        tracing::warn!("Skipped {} nutrients without a nutrient number", skipped_nutrients);
    }
    tracing::info!("Loaded {} nutrients", summary.nutrients);

    summary.facts = load_in_batches::<FoodNutrientRecord, _>(
        &mut conn,
        &dir.join(FOOD_NUTRIENT_CSV),
        batch_size,
        |tx, records| {
            let facts: Vec<FoodNutrient> = records
                .into_iter()
                .map(|record| FoodNutrient {
                    fdc_id: record.fdc_id,
                    nutrient_id: id_to_nbr
                        .get(&record.nutrient_id)
                        .copied()
                        .unwrap_or(record.nutrient_id),
                    amount: record.amount.unwrap_or(0.0),
                })
                .collect();
            store::insert_facts(tx, &facts)
        },
    )?;
    tracing::info!("Loaded {} food nutrient facts", summary.facts);

    summary.skipped = skipped_nutrients;
    conn.execute_batch(INDEXES)?;
    tracing::info!("Built search indexes");

    Ok(summary)
}

/// Stream `path` in chunks of `batch_size` records, one transaction each
fn load_in_batches<T, F>(
    conn: &mut Connection,
    path: &Path,
    batch_size: usize,
    mut insert: F,
) -> Result<usize>
where
    T: DeserializeOwned,
    F: FnMut(&Transaction<'_>, Vec<T>) -> Result<usize>,
{
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let mut records = reader.deserialize::<T>();
    let mut total = 0;
    let mut batches = 0;

    loop {
        let mut batch = Vec::with_capacity(batch_size);
        for record in records.by_ref().take(batch_size) {
            batch.push(record?);
        }
        if batch.is_empty() {
            break;
        }

        let tx = conn.transaction()?;
        total += insert(&tx, batch)?;
        tx.commit()?;
        batches += 1;
        tracing::debug!("Committed batch {} of {:?} ({} rows so far)", batches, path, total);
    }

    Ok(total)
}
