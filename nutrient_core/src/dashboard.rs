//! Event router for the interactive lookup dashboard.
//!
//! The front end turns user actions into [`Event`]s; each variant has one
//! handler that runs its queries and returns the [`View`] to render.

use crate::exclusion::{ExclusionEntry, SessionExclusions};
use crate::store::Store;
use crate::{BreakdownSlice, BubblePoint, FoodRow, NutrientNbr, NutrientRow, Result};
use serde::Serialize;

/// A user action
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// The user name input was submitted
    UserNameEntered(String),
    /// The nutrient search input changed
    NutrientSearchChanged(String),
    /// A row of the last nutrient table was clicked
    NutrientRowClicked(usize),
    /// The food search was submitted
    FoodSearchSubmitted(String),
    /// A row of the last food table was clicked
    FoodRowClicked(usize),
    /// The remove button of an exclusion entry was clicked
    RemoveExclusionClicked(NutrientNbr),
}

/// Pie chart of one food's nutrients
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PieChart {
    pub title: String,
    pub slices: Vec<BreakdownSlice>,
}

impl PieChart {
    fn for_food(label: &str, slices: Vec<BreakdownSlice>) -> Self {
        Self {
            title: format!("Nutrients in Food {}", label),
            slices,
        }
    }
}

/// Renderable output of a handler
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "view", content = "data", rename_all = "snake_case")]
pub enum View {
    FoodTable(Vec<FoodRow>),
    NutrientTable(Vec<NutrientRow>),
    ExclusionList(Vec<ExclusionEntry>),
    PieChart(PieChart),
    BubbleChart(Vec<BubblePoint>),
    /// Nothing to redraw
    Unchanged,
}

/// State of one interactive session
pub struct Dashboard {
    store: Store,
    user: Option<String>,
    exclusions: SessionExclusions,
    foods: Vec<FoodRow>,
    nutrients: Vec<NutrientRow>,
}

impl Dashboard {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            user: None,
            exclusions: SessionExclusions::new(),
            foods: Vec::new(),
            nutrients: Vec::new(),
        }
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn exclusions(&self) -> &SessionExclusions {
        &self.exclusions
    }

    /// Overview chart shown when the dashboard opens
    pub fn bubble_chart(&self) -> Result<View> {
        Ok(View::BubbleChart(self.store.bubble_summary()?))
    }

    /// Pie chart with no food selected
    pub fn empty_pie_chart() -> View {
        View::PieChart(PieChart::for_food("", Vec::new()))
    }

    pub fn handle(&mut self, event: Event) -> Result<View> {
        tracing::debug!("Handling {:?}", event);
        match event {
            Event::UserNameEntered(name) => self.on_user_name(name),
            Event::NutrientSearchChanged(term) => self.on_nutrient_search(&term),
            Event::NutrientRowClicked(row) => self.on_nutrient_row(row),
            Event::FoodSearchSubmitted(term) => self.on_food_search(&term),
            Event::FoodRowClicked(row) => self.on_food_row(row),
            Event::RemoveExclusionClicked(id) => self.on_remove_exclusion(id),
        }
    }

    fn on_user_name(&mut self, name: String) -> Result<View> {
        let name = name.trim().to_string();
        if name.is_empty() {
            self.user = None;
            return Ok(View::Unchanged);
        }

        self.exclusions.load_for_user(&self.store, &name)?;
        self.user = Some(name);
        Ok(self.exclusion_list())
    }

    fn on_nutrient_search(&mut self, term: &str) -> Result<View> {
        self.nutrients = self.store.search_nutrient_by_name(term)?;
        Ok(View::NutrientTable(self.nutrients.clone()))
    }

    fn on_nutrient_row(&mut self, row: usize) -> Result<View> {
        let Some(nutrient) = self.nutrients.get(row) else {
            tracing::debug!("Nutrient row {} is out of range", row);
            return Ok(View::Unchanged);
        };

        self.exclusions
            .add(&self.store, self.user.as_deref(), nutrient)?;
        Ok(self.exclusion_list())
    }

    fn on_food_search(&mut self, term: &str) -> Result<View> {
        self.foods = self
            .store
            .search_food_by_description(term, &self.exclusions.ids())?;
        Ok(View::FoodTable(self.foods.clone()))
    }

    fn on_food_row(&mut self, row: usize) -> Result<View> {
        let Some(food) = self.foods.get(row) else {
            return Ok(Self::empty_pie_chart());
        };

        let slices = self.store.nutrient_breakdown_for_food(food.fdc_id)?;
        Ok(View::PieChart(PieChart::for_food(&food.description, slices)))
    }

    fn on_remove_exclusion(&mut self, nutrient_id: NutrientNbr) -> Result<View> {
        if !self
            .exclusions
            .remove(&self.store, self.user.as_deref(), nutrient_id)?
        {
            return Ok(View::Unchanged);
        }
        Ok(self.exclusion_list())
    }

    fn exclusion_list(&self) -> View {
        View::ExclusionList(self.exclusions.entries().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Food, FoodNutrient, Nutrient};

    fn seeded_dashboard() -> Dashboard {
        let store = Store::open_in_memory().unwrap();
        store.init_schema().unwrap();
        let food = |fdc_id, description: &str| Food {
            fdc_id,
            description: description.into(),
            data_type: "foundation_food".into(),
            publication_date: None,
            food_code: None,
        };
        let nutrient = |nbr, name: &str| Nutrient {
            id: nbr,
            name: name.into(),
            unit_name: "G".into(),
            nutrient_nbr: nbr,
            rank: None,
        };
        let fact = |fdc_id, nutrient_id, amount| FoodNutrient {
            fdc_id,
            nutrient_id,
            amount,
        };
        store
            .append_batch(
                &[food(1, "Apple"), food(2, "Banana")],
                &[nutrient(10, "Sugars, total"), nutrient(20, "Starch")],
                &[fact(1, 10, 10.0), fact(1, 20, 5.0), fact(2, 10, 8.0)],
            )
            .unwrap();
        Dashboard::new(store)
    }

    fn food_ids(view: &View) -> Vec<i64> {
        match view {
            View::FoodTable(rows) => rows.iter().map(|r| r.fdc_id).collect(),
            other => panic!("expected food table, got {:?}", other),
        }
    }

    #[test]
    fn test_excluding_clicked_nutrient_filters_food_search() {
        let mut dash = seeded_dashboard();

        dash.handle(Event::NutrientSearchChanged("starch".into())).unwrap();
        let view = dash.handle(Event::NutrientRowClicked(0)).unwrap();
        assert!(matches!(view, View::ExclusionList(ref e) if e.len() == 1));

        let view = dash.handle(Event::FoodSearchSubmitted("A".into())).unwrap();
        assert_eq!(food_ids(&view), vec![2]);
    }

    #[test]
    fn test_double_click_keeps_single_entry() {
        let mut dash = seeded_dashboard();
        dash.handle(Event::NutrientSearchChanged("sugar".into())).unwrap();
        dash.handle(Event::NutrientRowClicked(0)).unwrap();
        dash.handle(Event::NutrientRowClicked(0)).unwrap();
        assert_eq!(dash.exclusions().ids(), vec![10]);
    }

    #[test]
    fn test_user_name_replaces_session_exclusions() {
        let mut dash = seeded_dashboard();
        dash.store.save_user_exclusion("alice", 10).unwrap();

        dash.handle(Event::NutrientSearchChanged("starch".into())).unwrap();
        dash.handle(Event::NutrientRowClicked(0)).unwrap();

        let view = dash.handle(Event::UserNameEntered("alice".into())).unwrap();
        assert_eq!(
            view,
            View::ExclusionList(vec![ExclusionEntry {
                nutrient_id: 10,
                name: "Sugars, total".into(),
            }])
        );
        assert_eq!(dash.user(), Some("alice"));
    }

    #[test]
    fn test_clicks_after_user_name_are_saved() {
        let mut dash = seeded_dashboard();
        dash.handle(Event::UserNameEntered("bob".into())).unwrap();
        dash.handle(Event::NutrientSearchChanged("starch".into())).unwrap();
        dash.handle(Event::NutrientRowClicked(0)).unwrap();

        assert_eq!(dash.store.load_user_exclusions("bob").unwrap(), vec![20]);
    }

    #[test]
    fn test_blank_user_name_is_ignored() {
        let mut dash = seeded_dashboard();
        let view = dash.handle(Event::UserNameEntered("   ".into())).unwrap();
        assert_eq!(view, View::Unchanged);
        assert_eq!(dash.user(), None);
    }

    #[test]
    fn test_food_row_click_builds_pie_chart() {
        let mut dash = seeded_dashboard();
        dash.handle(Event::FoodSearchSubmitted("apple".into())).unwrap();

        match dash.handle(Event::FoodRowClicked(0)).unwrap() {
            View::PieChart(chart) => {
                assert_eq!(chart.title, "Nutrients in Food Apple");
                assert_eq!(chart.slices.len(), 2);
            }
            other => panic!("expected pie chart, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_clicks() {
        let mut dash = seeded_dashboard();
        assert_eq!(dash.handle(Event::NutrientRowClicked(3)).unwrap(), View::Unchanged);

        match dash.handle(Event::FoodRowClicked(0)).unwrap() {
            View::PieChart(chart) => {
                assert_eq!(chart.title, "Nutrients in Food ");
                assert!(chart.slices.is_empty());
            }
            other => panic!("expected pie chart, got {:?}", other),
        }
    }

    #[test]
    fn test_remove_exclusion_restores_results() {
        let mut dash = seeded_dashboard();
        dash.handle(Event::UserNameEntered("carol".into())).unwrap();
        dash.handle(Event::NutrientSearchChanged("sugar".into())).unwrap();
        dash.handle(Event::NutrientRowClicked(0)).unwrap();
        let view = dash.handle(Event::FoodSearchSubmitted("a".into())).unwrap();
        assert!(food_ids(&view).is_empty());

        let view = dash.handle(Event::RemoveExclusionClicked(10)).unwrap();
        assert_eq!(view, View::ExclusionList(vec![]));
        assert!(dash.store.load_user_exclusions("carol").unwrap().is_empty());
        assert_eq!(
            dash.handle(Event::RemoveExclusionClicked(10)).unwrap(),
            View::Unchanged
        );

        let view = dash.handle(Event::FoodSearchSubmitted("a".into())).unwrap();
        assert_eq!(food_ids(&view), vec![1, 2]);
    }

    #[test]
    fn test_bubble_chart() {
        let dash = seeded_dashboard();
        match dash.bubble_chart().unwrap() {
            View::BubbleChart(points) => {
                assert_eq!(points.len(), 2);
                assert_eq!(points[0].label, "S");
            }
            other => panic!("expected bubble chart, got {:?}", other),
        }
    }

    #[test]
    fn test_view_serializes_with_tag() {
        let json = serde_json::to_value(View::Unchanged).unwrap();
        assert_eq!(json["view"], "unchanged");
        let json = serde_json::to_value(Dashboard::empty_pie_chart()).unwrap();
        assert_eq!(json["data"]["title"], "Nutrients in Food ");
    }
}
