// Server-rendered pages and the QR scan redirect

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect},
};
use reqwest::Url;
use std::collections::BTreeMap;

use crate::{
    campaigns,
    config::Settings,
    error::{AppError, AppResult},
    filters::{facet_counts, FilterSelection, QueryMap, SortKey, MILEAGE_CEILING, PRICE_CEILING},
    financing::{quick_quote, LoanRequest},
    models::{format_mileage, format_price, Car},
    AppState,
};

use super::api::search_inventory;

const EXPORT_PATH: &str = "/api/export/cars.csv";

// --- View models ---

struct SortOption {
    value: &'static str,
    label: &'static str,
    selected: bool,
}

struct FacetOption {
    value: String,
    count: usize,
    checked: bool,
}

struct CarCard {
    slug: String,
    name: String,
    price_label: String,
    // Struck-through previous price for listings on sale
    was_price_label: Option<String>,
    mileage_label: String,
    image: Option<String>,
    status: &'static str,
}

impl CarCard {
    fn new(car: &Car, settings: &Settings) -> Self {
        CarCard {
            slug: car.slug.clone(),
            name: car.title.clone().unwrap_or_else(|| car.display_name()),
            price_label: format_price(car.price, &car.currency),
            was_price_label: car
                .original_price
                .filter(|_| car.is_on_sale())
                .map(|original| format_price(original, &car.currency)),
            mileage_label: format_mileage(car.mileage),
            image: car.images.first().map(|reference| settings.image_url(reference)),
            status: car.status.as_str(),
        }
    }
}

struct Spec {
    label: &'static str,
    value: String,
}

struct FinancingView {
    monthly_label: String,
    down_payment_label: String,
    term_months: u32,
    annual_rate_percent: f64,
}

// --- Templates ---

#[derive(Template)]
#[template(path = "inventory.html")]
struct InventoryTemplate {
    cars: Vec<CarCard>,
    active_filters: usize,
    brand: String,
    model: String,
    // Range inputs, pre-filled so a resubmitted form keeps every bound
    min_price: String,
    max_price: String,
    min_year: String,
    max_year: String,
    min_mileage: String,
    max_mileage: String,
    price_ceiling: f64,
    mileage_ceiling: u32,
    brands: Vec<FacetOption>,
    body_types: Vec<FacetOption>,
    fuel_types: Vec<FacetOption>,
    transmissions: Vec<FacetOption>,
    colors: Vec<FacetOption>,
    sort_options: Vec<SortOption>,
    export_link: String,
}

#[derive(Template)]
#[template(path = "car.html")]
struct CarTemplate {
    car: CarCard,
    images: Vec<String>,
    description: String,
    specs: Vec<Spec>,
    features: Vec<String>,
    financing: Option<FinancingView>,
}

// Selected values with no available listing still get a (checked) box, so
// they survive the next submit
fn facet_options(mut counts: BTreeMap<String, usize>, selected: &[String]) -> Vec<FacetOption> {
    for value in selected {
        counts.entry(value.clone()).or_insert(0);
    }
    counts
        .into_iter()
        .map(|(value, count)| FacetOption {
            checked: selected.contains(&value),
            value,
            count,
        })
        .collect()
}

fn bound<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn inventory_view(selection: &FilterSelection, cars: &[Car], all_cars: &[Car], settings: &Settings) -> InventoryTemplate {
    let facets = facet_counts(all_cars);
    InventoryTemplate {
        cars: cars.iter().map(|car| CarCard::new(car, settings)).collect(),
        active_filters: selection.active_filter_count(),
        brand: selection.brand.clone().unwrap_or_default(),
        model: selection.model.clone().unwrap_or_default(),
        min_price: bound(selection.min_price),
        max_price: bound(selection.max_price),
        min_year: bound(selection.min_year),
        max_year: bound(selection.max_year),
        min_mileage: bound(selection.min_mileage),
        max_mileage: bound(selection.max_mileage),
        price_ceiling: PRICE_CEILING,
        mileage_ceiling: MILEAGE_CEILING,
        brands: facet_options(facets.brands, selection.brand.as_slice()),
        body_types: facet_options(facets.body_types, &selection.body_type),
        fuel_types: facet_options(facets.fuel_types, &selection.fuel_type),
        transmissions: facet_options(facets.transmissions, &selection.transmission),
        colors: facet_options(facets.colors, &selection.color),
        sort_options: SortKey::ALL
            .into_iter()
            .map(|key| SortOption {
                value: key.as_str(),
                label: key.label(),
                selected: key == selection.sort_by,
            })
            .collect(),
        export_link: export_link(selection),
    }
}

// CSV download link carrying the same normalized filters as the page
fn export_link(selection: &FilterSelection) -> String {
    let query = selection.to_query();
    if query.is_empty() {
        return EXPORT_PATH.to_string();
    }
    match Url::parse_with_params(&format!("http://localhost{}", EXPORT_PATH), query.iter()) {
        Ok(url) => format!("{}?{}", EXPORT_PATH, url.query().unwrap_or_default()),
        Err(e) => {
            tracing::warn!("Failed to build export link: {}", e);
            EXPORT_PATH.to_string()
        }
    }
}

fn specs(car: &Car) -> Vec<Spec> {
    let optional = [
        ("Body", car.body_type.clone()),
        ("Fuel", car.fuel_type.clone()),
        ("Transmission", car.transmission.clone()),
        ("Drive", car.drive_type.clone()),
        ("Exterior", car.exterior_color.clone()),
        ("Interior", car.interior_color.clone()),
        ("Engine", car.engine_cc.map(|cc| format!("{} cc", cc))),
        ("Power", car.power_hp.map(|hp| format!("{} hp", hp))),
        ("Doors", car.doors.map(|d| d.to_string())),
    ];

    let mut rows = vec![
        Spec { label: "Year", value: car.year.to_string() },
        Spec { label: "Mileage", value: format_mileage(car.mileage) },
    ];
    rows.extend(
        optional
            .into_iter()
            .filter_map(|(label, value)| value.filter(|v| !v.is_empty()).map(|value| Spec { label, value })),
    );
    rows
}

fn render<T: Template>(template: T, name: &str) -> AppResult<Html<String>> {
    match template.render() {
        Ok(html) => Ok(Html(html)),
        Err(e) => {
            tracing::error!("Failed to render {} template: {}", name, e);
            Err(AppError::InternalServerError(anyhow::Error::new(e)))
        }
    }
}

// --- Handlers ---

pub async fn inventory_page(
    State(app_state): State<AppState>,
    Query(query): Query<QueryMap>,
) -> AppResult<impl IntoResponse> {
    let selection = FilterSelection::from_query(&query);
    tracing::info!("[HANDLER] /inventory - {} active filters", selection.active_filter_count());

    // The facet panel lists every available value, not just the matching ones
    let everything = FilterSelection::default();
    let (cars, all_cars) = futures::try_join!(
        search_inventory(&app_state, &selection),
        search_inventory(&app_state, &everything),
    )?;
    let template = inventory_view(&selection, &cars, &all_cars, &app_state.settings);
    render(template, "inventory")
}

pub async fn car_page(
    State(app_state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<impl IntoResponse> {
    tracing::info!("[HANDLER] /cars/:slug - {}", slug);
    let car = app_state
        .backend
        .get_car_by_slug(&slug)
        .await
        .map_err(|e| AppError::InternalServerError(e.context(format!("Failed to fetch listing '{}'", slug))))?
        .ok_or_else(|| AppError::NotFound(format!("No listing with slug '{}'", slug)))?;

    let terms = LoanRequest::with_defaults(car.price);
    let financing = match quick_quote(car.price) {
        Ok(quote) => Some(FinancingView {
            monthly_label: format_price(quote.monthly_payment, &car.currency),
            down_payment_label: format_price(terms.down_payment, &car.currency),
            term_months: terms.term_months,
            annual_rate_percent: terms.annual_rate_percent,
        }),
        Err(e) => {
            tracing::warn!("No financing quote for listing {}: {}", car.id, e);
            None
        }
    };

    let template = CarTemplate {
        car: CarCard::new(&car, &app_state.settings),
        images: car.images.iter().map(|reference| app_state.settings.image_url(reference)).collect(),
        description: car.description.clone().unwrap_or_default(),
        specs: specs(&car),
        features: car.features.clone(),
        financing,
    };
    render(template, "car")
}

pub async fn qr_redirect(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let code = app_state
        .backend
        .get_qr_code(&id)
        .await
        .map_err(|e| AppError::InternalServerError(e.context("Failed to look up QR code")))?
        .ok_or_else(|| AppError::NotFound("Invalid QR Code".to_string()))?;

    // A lost scan count must not block the visitor
    if let Err(e) = app_state.backend.record_qr_scan(&code).await {
        tracing::warn!("Failed to record scan for QR code {}: {:?}", code.id, e);
    }

    let target = campaigns::redirect_target(&app_state.settings, &code.target_url);
    tracing::info!("[HANDLER] /qr/:id - '{}' -> {}", code.label, target);
    Ok(Redirect::temporary(&target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_settings;

    fn listing() -> Car {
        serde_json::from_value(serde_json::json!({
            "id": "c7",
            "slug": "mercedes-benz-g-63-2022",
            "brand": "Mercedes-Benz",
            "model": "G 63",
            "year": 2022,
            "price": 185000.0,
            "original_price": 199000.0,
            "currency": "CHF",
            "fuel_type": "Petrol",
            "power_hp": 585,
            "images": ["g63/front.jpg", "https://cdn.example.com/g63-side.jpg"],
            "status": "available",
            "created_at": "2024-03-01T10:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn card_shows_sale_price_and_new_mileage() {
        let card = CarCard::new(&listing(), &test_settings());
        assert_eq!(card.name, "2022 Mercedes-Benz G 63");
        assert_eq!(card.price_label, "CHF 185'000");
        assert_eq!(card.was_price_label.as_deref(), Some("CHF 199'000"));
        assert_eq!(card.mileage_label, "New");
        assert_eq!(
            card.image.as_deref(),
            Some("https://db.example.test/storage/v1/object/public/car-images/g63/front.jpg")
        );
    }

    #[test]
    fn spec_rows_skip_missing_columns() {
        let labels: Vec<&str> = specs(&listing()).iter().map(|s| s.label).collect();
        assert_eq!(labels, vec!["Year", "Mileage", "Fuel", "Power"]);
    }

    #[test]
    fn export_link_carries_normalized_filters() {
        assert_eq!(export_link(&FilterSelection::default()), "/api/export/cars.csv");

        let mut query = QueryMap::new();
        query.insert("brand".into(), "Porsche".into());
        query.insert("maxPrice".into(), "2000000".into());
        query.insert("bodyType".into(), "SUV,Coupe".into());
        let selection = FilterSelection::from_query(&query);
        assert_eq!(export_link(&selection), "/api/export/cars.csv?bodyType=SUV%2CCoupe&brand=Porsche");
    }

    #[test]
    fn inventory_template_renders_cards() {
        let settings = test_settings();
        let selection = FilterSelection { brand: Some("Mercedes-Benz".into()), ..Default::default() };
        let html = inventory_view(&selection, &[listing()], &[listing()], &settings).render().unwrap();
        assert!(html.contains("/cars/mercedes-benz-g-63-2022"));
        assert!(html.contains("CHF 185&#x27;000"));
    }

    #[test]
    fn form_keeps_every_active_filter() {
        let mut query = QueryMap::new();
        query.insert("maxPrice".into(), "100000".into());
        query.insert("minYear".into(), "2018".into());
        query.insert("minMileage".into(), "5000".into());
        query.insert("transmission".into(), "Manual".into());
        query.insert("color".into(), "Red".into());
        query.insert("sortBy".into(), "price_asc".into());
        let selection = FilterSelection::from_query(&query);

        let view = inventory_view(&selection, &[], &[listing()], &test_settings());
        assert_eq!(view.max_price, "100000");
        assert_eq!(view.min_year, "2018");
        assert_eq!(view.min_mileage, "5000");
        assert_eq!(view.max_mileage, "");
        // Neither value is carried by the only available listing
        let manual: Vec<(&str, bool)> = view.transmissions.iter().map(|o| (o.value.as_str(), o.checked)).collect();
        assert_eq!(manual, vec![("Manual", true)]);
        let colors: Vec<(&str, bool)> = view.colors.iter().map(|o| (o.value.as_str(), o.checked)).collect();
        assert_eq!(colors, vec![("Red", true)]);

        let html = view.render().unwrap();
        assert!(html.contains(r#"name="maxPrice" value="100000""#));
        assert!(html.contains(r#"name="minYear" value="2018""#));
        assert!(html.contains(r#"name="minMileage" value="5000""#));
        assert!(html.contains(r#"data-key="transmission" value="Manual" checked"#));
        assert!(html.contains(r#"data-key="color" value="Red" checked"#));
    }
}
