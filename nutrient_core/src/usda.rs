//! FoodData Central API client.
//!
//! Only the two endpoints the loader needs: the paginated food list and
//! the single-food detail document.

use crate::config::Config;
use crate::{FdcId, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT_SECONDS: u64 = 60;

/// One food as returned by `foods/list`
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiFood {
    pub fdc_id: FdcId,
    pub description: String,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub publication_date: Option<String>,
    /// Survey foods send this as a string, others omit it
    #[serde(default)]
    pub food_code: Option<Value>,
    #[serde(default)]
    pub food_nutrients: Vec<ApiFoodNutrient>,
}

/// One nested nutrient amount of an [`ApiFood`]
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiFoodNutrient {
    /// Nutrient number, usually a string such as `"203"`
    #[serde(default)]
    pub number: Option<Value>,
    pub name: String,
    #[serde(default)]
    pub unit_name: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
}

/// Read an integer sent either as a JSON number or a numeric string
pub fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

/// Source of food list pages
pub trait FoodPageSource {
    fn fetch_page(&self, page_number: u32, page_size: u32) -> Result<Vec<ApiFood>>;
}

/// Blocking client for the FoodData Central REST API
pub struct UsdaClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl UsdaClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Build a client from the `[api]` section (or `USDA_API_KEY`)
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.api.base_url.clone(), config.api_key()?)
    }

    /// Fetch the full detail document of one food
    pub fn fetch_food(&self, fdc_id: FdcId) -> Result<Value> {
        let url = format!("{}/food/{}", self.base_url, fdc_id);
        let detail = self
            .http
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .send()?
            .error_for_status()?
            .json::<Value>()?;
        Ok(detail)
    }
}

impl FoodPageSource for UsdaClient {
    fn fetch_page(&self, page_number: u32, page_size: u32) -> Result<Vec<ApiFood>> {
        let url = format!("{}/foods/list", self.base_url);
        tracing::info!("Pulling page {} ({} per page)", page_number, page_size);
        let foods = self
            .http
            .get(&url)
            .query(&[
                ("pageSize", page_size.to_string()),
                ("pageNumber", page_number.to_string()),
                ("api_key", self.api_key.clone()),
            ])
            .send()?
            .error_for_status()?
            .json::<Vec<ApiFood>>()?;
        Ok(foods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_list_page() {
        let body = json!([
            {
                "fdcId": 167512,
                "description": "Pillsbury Golden Layer Buttermilk Biscuits",
                "dataType": "SR Legacy",
                "publicationDate": "2019-04-01",
                "ndbNumber": "18634",
                "foodNutrients": [
                    {"number": "203", "name": "Protein", "amount": 5.88, "unitName": "G"},
                    {"number": "204", "name": "Total lipid (fat)", "amount": null, "unitName": "G"}
                ]
            },
            {
                "fdcId": 2345,
                "description": "Milk, whole",
                "dataType": "Survey (FNDDS)",
                "foodCode": "11100000"
            }
        ]);

        let foods: Vec<ApiFood> = serde_json::from_value(body).unwrap();
        assert_eq!(foods.len(), 2);
        assert_eq!(foods[0].fdc_id, 167512);
        assert_eq!(foods[0].food_nutrients.len(), 2);
        assert_eq!(foods[0].food_nutrients[1].amount, None);
        assert!(foods[1].food_nutrients.is_empty());
        assert_eq!(
            foods[1].food_code.as_ref().and_then(integer_value),
            Some(11100000)
        );
    }

    #[test]
    fn test_integer_value() {
        assert_eq!(integer_value(&json!("203")), Some(203));
        assert_eq!(integer_value(&json!(" 203.0 ")), Some(203));
        assert_eq!(integer_value(&json!(204)), Some(204));
        assert_eq!(integer_value(&json!(204.0)), Some(204));
        assert_eq!(integer_value(&json!("20.5")), None);
        assert_eq!(integer_value(&json!(null)), None);
    }

    #[test]
    fn test_client_trims_base_url() {
        let client = UsdaClient::new("https://example.test/fdc/v1/", "key").unwrap();
        assert_eq!(client.base_url, "https://example.test/fdc/v1");
    }
}
