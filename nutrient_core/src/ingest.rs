//! Paginated ingestion from the nutrition API.
//!
//! Each page of nested foods is reshaped into flat food, nutrient and fact
//! rows and committed in one transaction before the next page is requested,
//! so every stored fact has its nutrient definition.

use crate::store::Store;
use crate::usda::{integer_value, ApiFood, FoodPageSource};
use crate::{Food, FoodNutrient, Nutrient, NutrientNbr, Result, TableCounts};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Normalize a source date to `YYYY-MM-DD`
///
/// Dates in an unknown format are kept as written; blank input is `None`.
pub fn normalize_publication_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    // Timestamps such as "2019-04-01 00:00:00" keep only the date
    let date_part = raw.split_whitespace().next().unwrap_or(raw);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
        .map(|date| date.format("%Y-%m-%d").to_string())
        .or_else(|| Some(raw.to_string()))
}

/// Pagination limits for [`ingest_from_api`]
#[derive(Clone, Debug)]
pub struct PaginationOptions {
    pub page_size: u32,
    pub max_pages: u32,
    /// Directory for per-page CSV snapshots, if wanted
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            page_size: 200,
            max_pages: 20,
            snapshot_dir: None,
        }
    }
}

/// Why pagination ended
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// The page came back with no foods
    EmptyPage { page: u32 },
    /// The request failed; later pages were not requested
    FetchFailed { page: u32, error: String },
    /// `max_pages` pages were ingested
    PageLimit,
}

/// Outcome of an API ingestion run
///
/// Row counts are rows newly inserted; rows already stored are not counted.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct IngestSummary {
    pub pages: u32,
    pub foods: usize,
    pub facts: usize,
    pub nutrients: usize,
    pub stopped: StopReason,
}

/// Flat rows reshaped from one page
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageBatch {
    pub foods: Vec<Food>,
    /// Definitions of the nutrients referenced by `facts`
    pub nutrients: Vec<Nutrient>,
    pub facts: Vec<FoodNutrient>,
}

/// Flatten a page of nested foods
///
/// Nutrient definitions are merged into `seen` keyed by number.
/// Nested entries without a usable number are skipped; a missing or
/// negative amount becomes 0.
pub fn reshape_page(
    page: Vec<ApiFood>,
    seen: &mut BTreeMap<NutrientNbr, Nutrient>,
) -> PageBatch {
    let mut batch = PageBatch::default();
    let mut page_nutrients: BTreeMap<NutrientNbr, Nutrient> = BTreeMap::new();

    for api_food in page {
        for entry in &api_food.food_nutrients {
            let Some(number) = entry.number.as_ref().and_then(integer_value) else {
                tracing::debug!(
                    "Skipping nutrient {:?} of food {} without a number",
                    entry.name,
                    api_food.fdc_id
                );
                continue;
            };

            let definition = Nutrient {
                id: number,
                name: entry.name.clone(),
                unit_name: entry.unit_name.clone().unwrap_or_default(),
                nutrient_nbr: number,
                rank: None,
            };
            seen.insert(number, definition.clone());
            page_nutrients.insert(number, definition);
            batch.facts.push(FoodNutrient {
                fdc_id: api_food.fdc_id,
                nutrient_id: number,
                amount: entry.amount.filter(|a| *a > 0.0).unwrap_or(0.0),
            });
        }

        batch.foods.push(Food {
            fdc_id: api_food.fdc_id,
            description: api_food.description,
            data_type: api_food.data_type.unwrap_or_default(),
            publication_date: api_food
                .publication_date
                .as_deref()
                .and_then(normalize_publication_date),
            food_code: api_food.food_code.as_ref().and_then(integer_value),
        });
    }

    batch.nutrients = page_nutrients.into_values().collect();
    batch
}

/// Page through `source` and append every page to the store
///
/// Pages are numbered from 1. Pagination stops at the first empty page or
/// the first failed request; pages already committed stay. Store and
/// snapshot errors abort the run after the current page is committed.
pub fn ingest_from_api(
    store: &Store,
    source: &dyn FoodPageSource,
    options: &PaginationOptions,
) -> Result<IngestSummary> {
    let mut seen: BTreeMap<NutrientNbr, Nutrient> = BTreeMap::new();
    let mut pages = 0;
    let mut inserted = TableCounts::default();
    let mut stopped = StopReason::PageLimit;

    for page_number in 1..=options.max_pages {
        let page = match source.fetch_page(page_number, options.page_size) {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Fetching page {} failed, stopping: {}", page_number, e);
                stopped = StopReason::FetchFailed {
                    page: page_number,
                    error: e.to_string(),
                };
                break;
            }
        };

        if page.is_empty() {
            tracing::info!("Page {} is empty, stopping", page_number);
            stopped = StopReason::EmptyPage { page: page_number };
            break;
        }

        let batch = reshape_page(page, &mut seen);
        let added = store.append_batch(&batch.foods, &batch.nutrients, &batch.facts)?;
        pages += 1;
        inserted.foods += added.foods;
        inserted.nutrients += added.nutrients;
        inserted.facts += added.facts;
        tracing::info!(
            "Ingested page {}: {} new foods, {} new facts ({} rows on page)",
            page_number,
            added.foods,
            added.facts,
            batch.foods.len()
        );

        if let Some(dir) = &options.snapshot_dir {
            write_snapshot(dir, page_number, &batch, &seen)?;
        }
    }

    Ok(IngestSummary {
        pages,
        foods: inserted.foods,
        facts: inserted.facts,
        nutrients: inserted.nutrients,
        stopped,
    })
}

/// Write `food<N>.csv`, `food_nutrient<N>.csv` and `nutrient<N>.csv`
///
/// The nutrient file holds every definition seen so far.
pub fn write_snapshot(
    dir: &Path,
    page_number: u32,
    batch: &PageBatch,
    nutrients: &BTreeMap<NutrientNbr, Nutrient>,
) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    write_csv(&dir.join(format!("food{}.csv", page_number)), &batch.foods)?;
    write_csv(
        &dir.join(format!("food_nutrient{}.csv", page_number)),
        &batch.facts,
    )?;
    let definitions: Vec<&Nutrient> = nutrients.values().collect();
    write_csv(&dir.join(format!("nutrient{}.csv", page_number)), &definitions)?;

    tracing::debug!("Wrote snapshot of page {} to {:?}", page_number, dir);
    Ok(())
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
