// Faceted inventory search: filter selection, matching, ordering and the
// flat query-string form the selection travels in.

use crate::models::Car;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Flat string-keyed form of a selection, as found in a URL query string.
pub type QueryMap = BTreeMap<String, String>;

// Slider bounds. A bound sitting on one of these is the same as no bound.
pub const PRICE_FLOOR: f64 = 0.0;
pub const PRICE_CEILING: f64 = 2_000_000.0;
pub const MILEAGE_FLOOR: u32 = 0;
pub const MILEAGE_CEILING: u32 = 200_000;

const KEY_BRAND: &str = "brand";
const KEY_MODEL: &str = "model";
const KEY_MIN_PRICE: &str = "minPrice";
const KEY_MAX_PRICE: &str = "maxPrice";
const KEY_MIN_YEAR: &str = "minYear";
const KEY_MAX_YEAR: &str = "maxYear";
const KEY_MIN_MILEAGE: &str = "minMileage";
const KEY_MAX_MILEAGE: &str = "maxMileage";
const KEY_BODY_TYPE: &str = "bodyType";
const KEY_FUEL_TYPE: &str = "fuelType";
const KEY_TRANSMISSION: &str = "transmission";
const KEY_COLOR: &str = "color";
const KEY_SORT_BY: &str = "sortBy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    YearAsc,
    YearDesc,
    MileageAsc,
    MileageDesc,
}

impl SortKey {
    pub const ALL: [SortKey; 7] = [
        SortKey::Newest,
        SortKey::PriceAsc,
        SortKey::PriceDesc,
        SortKey::YearDesc,
        SortKey::YearAsc,
        SortKey::MileageAsc,
        SortKey::MileageDesc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Newest => "newest",
            SortKey::PriceAsc => "price_asc",
            SortKey::PriceDesc => "price_desc",
            SortKey::YearAsc => "year_asc",
            SortKey::YearDesc => "year_desc",
            SortKey::MileageAsc => "mileage_asc",
            SortKey::MileageDesc => "mileage_desc",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortKey::Newest => "Newest First",
            SortKey::PriceAsc => "Price: Low to High",
            SortKey::PriceDesc => "Price: High to Low",
            SortKey::YearAsc => "Year: Oldest",
            SortKey::YearDesc => "Year: Newest",
            SortKey::MileageAsc => "Mileage: Lowest",
            SortKey::MileageDesc => "Mileage: Highest",
        }
    }

    pub fn parse(value: &str) -> Option<SortKey> {
        SortKey::ALL.into_iter().find(|key| key.as_str() == value)
    }

    // PostgREST `order` clause, including the deterministic tie-break
    fn remote_order(&self) -> &'static str {
        match self {
            SortKey::Newest => "created_at.desc,id.asc",
            SortKey::PriceAsc => "price.asc,created_at.desc,id.asc",
            SortKey::PriceDesc => "price.desc,created_at.desc,id.asc",
            SortKey::YearAsc => "year.asc,created_at.desc,id.asc",
            SortKey::YearDesc => "year.desc,created_at.desc,id.asc",
            SortKey::MileageAsc => "mileage.asc.nullsfirst,created_at.desc,id.asc",
            SortKey::MileageDesc => "mileage.desc.nullslast,created_at.desc,id.asc",
        }
    }
}

/// The user's current search. Every constraint is optional; `None` or an
/// empty set leaves that facet unconstrained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSelection {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_year: Option<i32>,
    pub max_year: Option<i32>,
    pub min_mileage: Option<u32>,
    pub max_mileage: Option<u32>,
    pub body_type: Vec<String>,
    pub fuel_type: Vec<String>,
    pub transmission: Vec<String>,
    pub color: Vec<String>,
    pub sort_by: SortKey,
}

impl FilterSelection {
    /// Rebuilds a selection from its query-string form. Unparseable numbers and
    /// unknown sort keys are dropped rather than reported.
    pub fn from_query(query: &QueryMap) -> Self {
        let text = |key: &str| query.get(key).filter(|v| !v.is_empty()).cloned();
        let number = |key: &str| query.get(key).map(|v| v.trim());

        FilterSelection {
            brand: text(KEY_BRAND),
            model: text(KEY_MODEL),
            min_price: number(KEY_MIN_PRICE)
                .and_then(parse_price)
                .filter(|v| *v != PRICE_FLOOR),
            max_price: number(KEY_MAX_PRICE)
                .and_then(parse_price)
                .filter(|v| *v != PRICE_CEILING),
            min_year: number(KEY_MIN_YEAR).and_then(|v| v.parse().ok()),
            max_year: number(KEY_MAX_YEAR).and_then(|v| v.parse().ok()),
            min_mileage: number(KEY_MIN_MILEAGE)
                .and_then(|v| v.parse().ok())
                .filter(|v| *v != MILEAGE_FLOOR),
            max_mileage: number(KEY_MAX_MILEAGE)
                .and_then(|v| v.parse().ok())
                .filter(|v| *v != MILEAGE_CEILING),
            body_type: split_set(query.get(KEY_BODY_TYPE)),
            fuel_type: split_set(query.get(KEY_FUEL_TYPE)),
            transmission: split_set(query.get(KEY_TRANSMISSION)),
            color: split_set(query.get(KEY_COLOR)),
            sort_by: query
                .get(KEY_SORT_BY)
                .and_then(|v| SortKey::parse(v))
                .unwrap_or_default(),
        }
    }

    /// Flattens the selection. Absent values, empty sets, bounds equal to the
    /// slider defaults and the default sort are left out.
    pub fn to_query(&self) -> QueryMap {
        let mut query = QueryMap::new();

        let mut put = |key: &str, value: Option<String>| {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                query.insert(key.to_string(), value);
            }
        };

        put(KEY_BRAND, self.brand.clone());
        put(KEY_MODEL, self.model.clone());
        put(
            KEY_MIN_PRICE,
            self.min_price
                .filter(|v| v.is_finite() && *v != PRICE_FLOOR)
                .map(|v| v.to_string()),
        );
        put(
            KEY_MAX_PRICE,
            self.max_price
                .filter(|v| v.is_finite() && *v != PRICE_CEILING)
                .map(|v| v.to_string()),
        );
        put(KEY_MIN_YEAR, self.min_year.map(|v| v.to_string()));
        put(KEY_MAX_YEAR, self.max_year.map(|v| v.to_string()));
        put(
            KEY_MIN_MILEAGE,
            self.min_mileage.filter(|v| *v != MILEAGE_FLOOR).map(|v| v.to_string()),
        );
        put(
            KEY_MAX_MILEAGE,
            self.max_mileage.filter(|v| *v != MILEAGE_CEILING).map(|v| v.to_string()),
        );
        put(KEY_BODY_TYPE, join_set(&self.body_type));
        put(KEY_FUEL_TYPE, join_set(&self.fuel_type));
        put(KEY_TRANSMISSION, join_set(&self.transmission));
        put(KEY_COLOR, join_set(&self.color));
        if self.sort_by != SortKey::Newest {
            put(KEY_SORT_BY, Some(self.sort_by.as_str().to_string()));
        }

        query
    }

    /// Number of facets currently narrowing the result (sorting excluded).
    pub fn active_filter_count(&self) -> usize {
        let scalars = [
            self.brand.as_deref().is_some_and(|v| !v.is_empty()),
            self.model.as_deref().is_some_and(|v| !v.is_empty()),
            self.min_price.is_some(),
            self.max_price.is_some(),
            self.min_year.is_some(),
            self.max_year.is_some(),
            self.min_mileage.is_some(),
            self.max_mileage.is_some(),
        ];
        let sets = [&self.body_type, &self.fuel_type, &self.transmission, &self.color];
        scalars.iter().filter(|active| **active).count()
            + sets.iter().filter(|set| !set.is_empty()).count()
    }

    /// True when the listing satisfies every active facet.
    pub fn matches(&self, car: &Car) -> bool {
        if let Some(brand) = self.brand.as_deref().filter(|b| !b.is_empty()) {
            if car.brand.to_lowercase() != brand.to_lowercase() {
                return false;
            }
        }
        if let Some(model) = self.model.as_deref().filter(|m| !m.is_empty()) {
            if !car.model.to_lowercase().contains(&model.to_lowercase()) {
                return false;
            }
        }

        within(car.price, self.min_price, self.max_price)
            && within(car.year, self.min_year, self.max_year)
            && within(car.odometer(), self.min_mileage, self.max_mileage)
            && in_set(&self.body_type, car.body_type.as_deref())
            && in_set(&self.fuel_type, car.fuel_type.as_deref())
            && in_set(&self.transmission, car.transmission.as_deref())
            && in_set(&self.color, car.exterior_color.as_deref())
    }

    /// Query parameters that push every active facet down into the backend's
    /// REST query. Facets whose values cannot be expressed safely are left to
    /// the in-memory pass, so the remote result is always a superset.
    pub fn remote_query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();

        if let Some(brand) = self.brand.as_deref().filter(|b| is_pattern_safe(b)) {
            params.push(("brand".to_string(), format!("ilike.{}", brand)));
        }
        if let Some(model) = self.model.as_deref().filter(|m| is_pattern_safe(m)) {
            params.push(("model".to_string(), format!("ilike.*{}*", model)));
        }
        if let Some(min) = self.min_price.filter(|v| v.is_finite()) {
            params.push(("price".to_string(), format!("gte.{}", min)));
        }
        if let Some(max) = self.max_price.filter(|v| v.is_finite()) {
            params.push(("price".to_string(), format!("lte.{}", max)));
        }
        if let Some(min) = self.min_year {
            params.push(("year".to_string(), format!("gte.{}", min)));
        }
        if let Some(max) = self.max_year {
            params.push(("year".to_string(), format!("lte.{}", max)));
        }
        // A missing reading counts as 0 km, so only a positive floor excludes it
        if let Some(min) = self.min_mileage.filter(|v| *v > 0) {
            params.push(("mileage".to_string(), format!("gte.{}", min)));
        }
        if let Some(max) = self.max_mileage {
            params.push(("or".to_string(), format!("(mileage.is.null,mileage.lte.{})", max)));
        }

        let sets = [
            ("body_type", &self.body_type),
            ("fuel_type", &self.fuel_type),
            ("transmission", &self.transmission),
            ("exterior_color", &self.color),
        ];
        for (column, values) in sets {
            if values.is_empty() || values.iter().any(|v| v.contains(['"', '\\'])) {
                continue;
            }
            let quoted: Vec<String> = values.iter().map(|v| format!("\"{}\"", v)).collect();
            params.push((column.to_string(), format!("in.({})", quoted.join(","))));
        }

        params.push(("order".to_string(), self.sort_by.remote_order().to_string()));
        params
    }
}

/// Keeps the listings matching every active facet, ordered by the selection's
/// sort key. Equal keys fall back to newest first, then id.
pub fn apply_filters(selection: &FilterSelection, cars: Vec<Car>) -> Vec<Car> {
    let mut matching: Vec<Car> = cars.into_iter().filter(|car| selection.matches(car)).collect();
    sort_cars(&mut matching, selection.sort_by);
    matching
}

pub fn sort_cars(cars: &mut [Car], sort_by: SortKey) {
    cars.sort_by(|a, b| compare(sort_by, a, b));
}

fn compare(sort_by: SortKey, a: &Car, b: &Car) -> Ordering {
    let primary = match sort_by {
        SortKey::Newest => Ordering::Equal,
        SortKey::PriceAsc => a.price.total_cmp(&b.price),
        SortKey::PriceDesc => b.price.total_cmp(&a.price),
        SortKey::YearAsc => a.year.cmp(&b.year),
        SortKey::YearDesc => b.year.cmp(&a.year),
        SortKey::MileageAsc => a.odometer().cmp(&b.odometer()),
        SortKey::MileageDesc => b.odometer().cmp(&a.odometer()),
    };
    primary
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Distinct values per facet with how many listings carry each.
#[derive(Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FacetCounts {
    pub brands: BTreeMap<String, usize>,
    pub body_types: BTreeMap<String, usize>,
    pub fuel_types: BTreeMap<String, usize>,
    pub transmissions: BTreeMap<String, usize>,
    pub colors: BTreeMap<String, usize>,
    pub min_year: Option<i32>,
    pub max_year: Option<i32>,
}

pub fn facet_counts(cars: &[Car]) -> FacetCounts {
    let mut counts = FacetCounts::default();
    for car in cars {
        *counts.brands.entry(car.brand.clone()).or_default() += 1;
        bump(&mut counts.body_types, car.body_type.as_deref());
        bump(&mut counts.fuel_types, car.fuel_type.as_deref());
        bump(&mut counts.transmissions, car.transmission.as_deref());
        bump(&mut counts.colors, car.exterior_color.as_deref());
        counts.min_year = Some(counts.min_year.map_or(car.year, |y| y.min(car.year)));
        counts.max_year = Some(counts.max_year.map_or(car.year, |y| y.max(car.year)));
    }
    counts
}

fn bump(map: &mut BTreeMap<String, usize>, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        *map.entry(value.to_string()).or_default() += 1;
    }
}

fn within<T: PartialOrd>(value: T, min: Option<T>, max: Option<T>) -> bool {
    min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
}

fn in_set(selected: &[String], value: Option<&str>) -> bool {
    selected.is_empty() || value.is_some_and(|v| selected.iter().any(|s| s == v))
}

fn parse_price(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

// Comma-joined lists carry no escaping; values are trimmed and blanks dropped
fn split_set(raw: Option<&String>) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    for part in raw.map(|r| r.split(',')).into_iter().flatten() {
        let part = part.trim();
        if !part.is_empty() && !values.iter().any(|v| v == part) {
            values.push(part.to_string());
        }
    }
    values
}

fn join_set(values: &[String]) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for value in values.iter().map(|v| v.trim()) {
        if !value.is_empty() && !parts.contains(&value) {
            parts.push(value);
        }
    }
    (!parts.is_empty()).then(|| parts.join(","))
}

fn is_pattern_safe(value: &str) -> bool {
    !value.is_empty() && !value.contains(['%', '_', '*', '\\', ',', '(', ')'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CarStatus;
    use chrono::{TimeZone, Utc};

    fn car(id: &str, brand: &str, model: &str, year: i32, price: f64, mileage: Option<u32>, day: u32) -> Car {
        Car {
            id: id.to_string(),
            slug: format!("{}-{}", brand.to_lowercase(), id),
            title: None,
            brand: brand.to_string(),
            model: model.to_string(),
            variant: None,
            year,
            price,
            original_price: None,
            currency: "CHF".to_string(),
            price_type: Default::default(),
            mileage,
            body_type: None,
            fuel_type: None,
            transmission: None,
            drive_type: None,
            exterior_color: None,
            interior_color: None,
            engine_cc: None,
            power_hp: None,
            doors: None,
            status: CarStatus::Available,
            condition: None,
            images: Vec::new(),
            description: None,
            features: Vec::new(),
            created_at: Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap(),
        }
    }

    fn inventory() -> Vec<Car> {
        let mut dbx = car("a", "Aston Martin", "DBX 707", 2023, 245_000.0, Some(8_000), 1);
        dbx.body_type = Some("SUV".into());
        dbx.fuel_type = Some("Petrol".into());
        dbx.transmission = Some("Automatic".into());
        dbx.exterior_color = Some("Black".into());

        let mut taycan = car("b", "Porsche", "Taycan Turbo S", 2022, 149_000.0, Some(21_000), 2);
        taycan.body_type = Some("Sedan".into());
        taycan.fuel_type = Some("Electric".into());
        taycan.transmission = Some("Automatic".into());
        taycan.exterior_color = Some("White".into());

        let mut gt3 = car("c", "Porsche", "911 GT3", 2021, 189_000.0, None, 3);
        gt3.body_type = Some("Coupe".into());
        gt3.fuel_type = Some("Petrol".into());
        gt3.transmission = Some("Manual".into());
        gt3.exterior_color = Some("Silver".into());

        let mut g63 = car("d", "Mercedes-Benz", "G 63 AMG", 2021, 189_000.0, Some(35_000), 4);
        g63.body_type = Some("SUV".into());
        g63.fuel_type = Some("Petrol".into());
        g63.transmission = Some("Automatic".into());

        vec![dbx, taycan, gt3, g63]
    }

    fn ids(cars: &[Car]) -> Vec<&str> {
        cars.iter().map(|c| c.id.as_str()).collect()
    }

    fn query(pairs: &[(&str, &str)]) -> QueryMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn empty_selection_returns_everything_newest_first() {
        let result = apply_filters(&FilterSelection::default(), inventory());
        assert_eq!(ids(&result), vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn brand_is_case_insensitive_exact() {
        let selection = FilterSelection { brand: Some("porsche".into()), ..Default::default() };
        assert_eq!(ids(&apply_filters(&selection, inventory())), vec!["c", "b"]);

        let partial = FilterSelection { brand: Some("Pors".into()), ..Default::default() };
        assert!(apply_filters(&partial, inventory()).is_empty());
    }

    #[test]
    fn model_is_case_insensitive_substring() {
        let selection = FilterSelection { model: Some("gt3".into()), ..Default::default() };
        assert_eq!(ids(&apply_filters(&selection, inventory())), vec!["c"]);
    }

    #[test]
    fn ranges_are_inclusive_and_one_sided() {
        let selection = FilterSelection {
            min_price: Some(149_000.0),
            max_price: Some(189_000.0),
            ..Default::default()
        };
        assert_eq!(ids(&apply_filters(&selection, inventory())), vec!["d", "c", "b"]);

        let years = FilterSelection { min_year: Some(2022), ..Default::default() };
        assert_eq!(ids(&apply_filters(&years, inventory())), vec!["b", "a"]);

        let older = FilterSelection { max_year: Some(2021), ..Default::default() };
        assert_eq!(ids(&apply_filters(&older, inventory())), vec!["d", "c"]);
    }

    #[test]
    fn new_cars_count_as_zero_mileage() {
        let low = FilterSelection { max_mileage: Some(10_000), ..Default::default() };
        assert_eq!(ids(&apply_filters(&low, inventory())), vec!["c", "a"]);

        let used = FilterSelection { min_mileage: Some(1), ..Default::default() };
        assert_eq!(ids(&apply_filters(&used, inventory())), vec!["d", "b", "a"]);
    }

    #[test]
    fn set_facets_require_membership() {
        let suv = FilterSelection { body_type: vec!["SUV".into()], ..Default::default() };
        assert_eq!(ids(&apply_filters(&suv, inventory())), vec!["d", "a"]);

        let colors = FilterSelection { color: vec!["White".into(), "Silver".into()], ..Default::default() };
        assert_eq!(ids(&apply_filters(&colors, inventory())), vec!["c", "b"]);

        // g63 has no colour recorded and never matches a colour constraint
        let black = FilterSelection { color: vec!["Black".into()], ..Default::default() };
        assert_eq!(ids(&apply_filters(&black, inventory())), vec!["a"]);
    }

    #[test]
    fn facets_combine_with_and() {
        let selection = FilterSelection {
            brand: Some("Porsche".into()),
            fuel_type: vec!["Petrol".into()],
            transmission: vec!["Manual".into(), "Automatic".into()],
            ..Default::default()
        };
        assert_eq!(ids(&apply_filters(&selection, inventory())), vec!["c"]);

        // Check the result against the predicate for every listing
        let all = inventory();
        let result = apply_filters(&selection, all.clone());
        for car in &all {
            let expected = car.brand == "Porsche"
                && car.fuel_type.as_deref() == Some("Petrol")
                && car.transmission.is_some();
            assert_eq!(expected, result.iter().any(|r| r.id == car.id));
        }
    }

    #[test]
    fn unmatched_selection_yields_empty_result() {
        let selection = FilterSelection { brand: Some("Nonexistent".into()), ..Default::default() };
        assert!(apply_filters(&selection, inventory()).is_empty());
        assert!(apply_filters(&FilterSelection::default(), Vec::new()).is_empty());
    }

    #[test]
    fn price_sorts_break_ties_by_newest() {
        let asc = FilterSelection { sort_by: SortKey::PriceAsc, ..Default::default() };
        let result = apply_filters(&asc, inventory());
        assert_eq!(ids(&result), vec!["b", "d", "c", "a"]);
        assert!(result.windows(2).all(|w| w[0].price <= w[1].price));

        let desc = FilterSelection { sort_by: SortKey::PriceDesc, ..Default::default() };
        let result = apply_filters(&desc, inventory());
        assert_eq!(ids(&result), vec!["a", "d", "c", "b"]);
        assert!(result.windows(2).all(|w| w[0].price >= w[1].price));
    }

    #[test]
    fn year_and_mileage_sorts_are_monotonic() {
        let year_asc = apply_filters(&FilterSelection { sort_by: SortKey::YearAsc, ..Default::default() }, inventory());
        assert!(year_asc.windows(2).all(|w| w[0].year <= w[1].year));
        assert_eq!(ids(&year_asc), vec!["d", "c", "b", "a"]);

        let year_desc = apply_filters(&FilterSelection { sort_by: SortKey::YearDesc, ..Default::default() }, inventory());
        assert!(year_desc.windows(2).all(|w| w[0].year >= w[1].year));

        let km_asc = apply_filters(&FilterSelection { sort_by: SortKey::MileageAsc, ..Default::default() }, inventory());
        assert_eq!(ids(&km_asc), vec!["c", "a", "b", "d"]);

        let km_desc = apply_filters(&FilterSelection { sort_by: SortKey::MileageDesc, ..Default::default() }, inventory());
        assert!(km_desc.windows(2).all(|w| w[0].odometer() >= w[1].odometer()));
    }

    #[test]
    fn identical_timestamps_fall_back_to_id() {
        let mut cars = vec![
            car("z", "BMW", "M4", 2022, 90_000.0, None, 9),
            car("m", "BMW", "M3", 2022, 90_000.0, None, 9),
        ];
        sort_cars(&mut cars, SortKey::PriceAsc);
        assert_eq!(ids(&cars), vec!["m", "z"]);
    }

    #[test]
    fn serialization_omits_defaults_and_joins_sets() {
        let selection = FilterSelection {
            brand: Some("Porsche".into()),
            model: Some(String::new()),
            min_price: Some(0.0),
            max_price: Some(150_000.0),
            max_mileage: Some(MILEAGE_CEILING),
            body_type: vec!["SUV".into(), "Coupe".into()],
            fuel_type: Vec::new(),
            sort_by: SortKey::Newest,
            ..Default::default()
        };
        let expected = query(&[("brand", "Porsche"), ("maxPrice", "150000"), ("bodyType", "SUV,Coupe")]);
        assert_eq!(selection.to_query(), expected);
    }

    #[test]
    fn deserialization_degrades_malformed_values() {
        let selection = FilterSelection::from_query(&query(&[
            ("minPrice", "cheap"),
            ("maxPrice", "NaN"),
            ("minYear", "2019"),
            ("maxMileage", "-5"),
            ("fuelType", "Petrol,,Hybrid"),
            ("sortBy", "by_vibes"),
        ]));
        assert_eq!(selection.min_price, None);
        assert_eq!(selection.max_price, None);
        assert_eq!(selection.min_year, Some(2019));
        assert_eq!(selection.max_mileage, None);
        assert_eq!(selection.fuel_type, vec!["Petrol".to_string(), "Hybrid".to_string()]);
        assert_eq!(selection.sort_by, SortKey::Newest);
        assert_eq!(selection.active_filter_count(), 2);
    }

    #[test]
    fn default_bounds_normalize_to_absent() {
        let selection = FilterSelection::from_query(&query(&[
            ("minPrice", "0"),
            ("maxPrice", "2000000"),
            ("minMileage", "0"),
            ("maxMileage", "200000"),
        ]));
        assert_eq!(selection, FilterSelection::default());
        assert!(selection.to_query().is_empty());
    }

    #[test]
    fn round_trip_is_idempotent() {
        let selections = vec![
            FilterSelection::default(),
            FilterSelection {
                brand: Some("Aston Martin".into()),
                model: Some(" DB".into()),
                min_price: Some(12_500.5),
                max_price: Some(PRICE_CEILING),
                min_year: Some(1965),
                max_year: Some(2024),
                min_mileage: Some(500),
                max_mileage: Some(90_000),
                body_type: vec![" SUV ".into(), String::new(), "Coupe".into()],
                fuel_type: vec!["Electric".into()],
                transmission: vec!["Manual".into()],
                color: vec!["British Racing Green".into()],
                sort_by: SortKey::MileageDesc,
            },
            FilterSelection { min_price: Some(-1.0), sort_by: SortKey::YearAsc, ..Default::default() },
            FilterSelection {
                body_type: vec!["SUV".into(), "SUV".into()],
                fuel_type: vec!["Hybrid".into(), " Petrol".into(), "Hybrid ".into(), "Diesel".into()],
                color: vec!["Red".into(), "Blue".into(), "Red".into()],
                ..Default::default()
            },
            FilterSelection {
                transmission: vec!["Manual".into(), "Automatic".into()],
                color: vec!["Blue".into(), "Red".into()],
                ..Default::default()
            },
        ];

        for selection in selections {
            let once = selection.to_query();
            let rebuilt = FilterSelection::from_query(&once);
            assert_eq!(rebuilt.to_query(), once);
            assert_eq!(FilterSelection::from_query(&rebuilt.to_query()), rebuilt);
        }
    }

    #[test]
    fn duplicate_set_values_serialize_once_in_first_seen_order() {
        let selection = FilterSelection {
            body_type: vec!["SUV".into(), "SUV".into()],
            color: vec!["Red".into(), " Blue".into(), "Red".into()],
            ..Default::default()
        };
        let once = selection.to_query();
        assert_eq!(once.get("bodyType").map(String::as_str), Some("SUV"));
        assert_eq!(once.get("color").map(String::as_str), Some("Red,Blue"));
        assert_eq!(FilterSelection::from_query(&once).to_query(), once);
    }

    #[test]
    fn every_sort_key_parses_back() {
        for key in SortKey::ALL {
            assert_eq!(SortKey::parse(key.as_str()), Some(key));
        }
    }

    #[test]
    fn remote_params_push_down_active_facets() {
        let selection = FilterSelection {
            brand: Some("Porsche".into()),
            model: Some("911".into()),
            min_price: Some(100_000.0),
            min_mileage: Some(0),
            max_mileage: Some(50_000),
            body_type: vec!["Coupe".into(), "Cabriolet".into()],
            sort_by: SortKey::PriceDesc,
            ..Default::default()
        };
        let params = selection.remote_query_params();
        let has = |k: &str, v: &str| params.iter().any(|(pk, pv)| pk == k && pv == v);
        assert!(has("brand", "ilike.Porsche"));
        assert!(has("model", "ilike.*911*"));
        assert!(has("price", "gte.100000"));
        assert!(has("or", "(mileage.is.null,mileage.lte.50000)"));
        assert!(has("body_type", "in.(\"Coupe\",\"Cabriolet\")"));
        assert!(has("order", "price.desc,created_at.desc,id.asc"));
        assert!(!params.iter().any(|(k, _)| k == "mileage"));
    }

    #[test]
    fn wildcard_values_stay_in_memory() {
        let selection = FilterSelection { model: Some("100%_EV".into()), ..Default::default() };
        let params = selection.remote_query_params();
        assert!(!params.iter().any(|(k, _)| k == "model"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn facet_counts_tally_distinct_values() {
        let counts = facet_counts(&inventory());
        assert_eq!(counts.brands.get("Porsche"), Some(&2));
        assert_eq!(counts.body_types.get("SUV"), Some(&2));
        assert_eq!(counts.colors.len(), 3);
        assert_eq!(counts.min_year, Some(2021));
        assert_eq!(counts.max_year, Some(2023));
    }
}
