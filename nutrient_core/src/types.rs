//! Core domain types for Nutrilook.
//!
//! This module defines the fundamental types used throughout the system:
//! - Foods and nutrients as stored in the schema
//! - Food-nutrient facts (the join table)
//! - Rows returned by the query layer for tables and charts

use serde::{Deserialize, Serialize};

/// FoodData Central id of a food
pub type FdcId = i64;

/// Nutrient number (`nutrient.nutrient_nbr`), the identity of a nutrient
pub type NutrientNbr = i64;

// ============================================================================
// Stored Entities
// ============================================================================

/// A food as ingested into the `food` table
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Food {
    pub fdc_id: FdcId,
    pub description: String,
    /// Source tag, e.g. "branded_food" or "Survey (FNDDS)"
    pub data_type: String,
    /// ISO `YYYY-MM-DD` when the source date could be parsed
    pub publication_date: Option<String>,
    pub food_code: Option<i64>,
}

/// A nutrient definition from the `nutrient` table
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Nutrient {
    pub id: i64,
    pub name: String,
    pub unit_name: String,
    pub nutrient_nbr: NutrientNbr,
    pub rank: Option<f64>,
}

/// Amount of one nutrient present in one food
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FoodNutrient {
    pub fdc_id: FdcId,
    pub nutrient_id: NutrientNbr,
    pub amount: f64,
}

// ============================================================================
// Query Results
// ============================================================================

/// A row of the food search table
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FoodRow {
    pub fdc_id: FdcId,
    pub data_type: String,
    pub description: String,
    pub publication_date: Option<String>,
}

/// A raw row of the food x food_nutrient join used for exclusion filtering
///
/// `nutrient_id` is `None` for foods without any nutrient facts.
#[derive(Clone, Debug, PartialEq)]
pub struct FoodNutrientHit {
    pub food: FoodRow,
    pub nutrient_id: Option<NutrientNbr>,
}

/// A row of the nutrient search table
pub type NutrientRow = Nutrient;

/// One slice of a food's nutrient pie chart
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BreakdownSlice {
    pub name: String,
    pub amount: f64,
}

/// One bubble of the overview chart
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BubblePoint {
    /// First letter of the nutrient name
    pub label: String,
    pub name: String,
    pub unit_name: String,
    /// Number of food-nutrient facts for this nutrient
    pub count: i64,
}

/// Row counts of the main tables
#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
pub struct TableCounts {
    pub foods: usize,
    pub nutrients: usize,
    pub facts: usize,
}
