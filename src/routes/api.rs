// Handlers for the public JSON API

use axum::{
    extract::{Json as JsonExtract, Path, Query, State},
    http::header,
    response::{IntoResponse, Json},
};
use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    filters::{self, apply_filters, FilterSelection, QueryMap},
    financing::{LoanQuote, LoanRequest},
    forms::{InquiryRequest, TradeInForm, WizardStep},
    models::{format_price, Car, CarStatus},
    AppState,
};

// --- Response Wrappers ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CarsResponse {
    success: bool,
    count: usize,
    active_filters: usize,
    // Normalized form of the request's filters, suitable for the address bar
    query: QueryMap,
    cars: Vec<Car>,
}

#[derive(Serialize)]
pub(super) struct GenericResponse {
    pub success: bool,
    pub message: Option<String>,
    pub id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FinancingResponse {
    request: LoanRequest,
    quote: LoanQuote,
    monthly_payment_label: String,
    total_cost_label: String,
}

// --- Request Structs ---

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FinancingQuery {
    price: f64,
    down_payment: Option<f64>,
    term_months: Option<u32>,
    annual_rate_percent: Option<f64>,
    currency: Option<String>,
}

// Available listings matching the selection, in the selection's order
pub(super) async fn search_inventory(app_state: &AppState, selection: &FilterSelection) -> AppResult<Vec<Car>> {
    let fetched = app_state
        .backend
        .list_cars(selection, Some(CarStatus::Available))
        .await
        .map_err(|e| AppError::InternalServerError(e.context("Failed to fetch inventory")))?;
    Ok(apply_filters(selection, fetched))
}

// --- API Handlers ---

pub async fn list_cars(
    State(app_state): State<AppState>,
    Query(query): Query<QueryMap>,
) -> AppResult<impl IntoResponse> {
    let selection = FilterSelection::from_query(&query);
    tracing::info!("[HANDLER] /api/cars - {} active filters, sort {}", selection.active_filter_count(), selection.sort_by.as_str());

    let cars = search_inventory(&app_state, &selection).await?;
    tracing::info!("[HANDLER] /api/cars - Returning {} listings.", cars.len());

    Ok(Json(CarsResponse {
        success: true,
        count: cars.len(),
        active_filters: selection.active_filter_count(),
        query: selection.to_query(),
        cars,
    }))
}

#[derive(Serialize)]
struct ExportRow<'a> {
    slug: &'a str,
    brand: &'a str,
    model: &'a str,
    year: i32,
    price: f64,
    currency: &'a str,
    mileage: Option<u32>,
    body_type: Option<&'a str>,
    fuel_type: Option<&'a str>,
    transmission: Option<&'a str>,
    exterior_color: Option<&'a str>,
    status: &'a str,
}

pub(super) fn inventory_csv(cars: &[Car]) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for car in cars {
        writer.serialize(ExportRow {
            slug: &car.slug,
            brand: &car.brand,
            model: &car.model,
            year: car.year,
            price: car.price,
            currency: &car.currency,
            mileage: car.mileage,
            body_type: car.body_type.as_deref(),
            fuel_type: car.fuel_type.as_deref(),
            transmission: car.transmission.as_deref(),
            exterior_color: car.exterior_color.as_deref(),
            status: car.status.as_str(),
        })?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e))
}

pub async fn export_cars(
    State(app_state): State<AppState>,
    Query(query): Query<QueryMap>,
) -> AppResult<impl IntoResponse> {
    let selection = FilterSelection::from_query(&query);
    let cars = search_inventory(&app_state, &selection).await?;
    let body = inventory_csv(&cars).map_err(|e| AppError::InternalServerError(e.context("Failed to write inventory CSV")))?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    tracing::info!("[HANDLER] /api/export/cars.csv - Exported {} listings.", cars.len());
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"inventory_{}.csv\"", timestamp)),
        ],
        body,
    ))
}

pub async fn get_car(
    State(app_state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<impl IntoResponse> {
    tracing::info!("[HANDLER] /api/cars/:slug - Request received for slug: {}", slug);
    let car = app_state
        .backend
        .get_car_by_slug(&slug)
        .await
        .map_err(|e| AppError::InternalServerError(e.context(format!("Failed to fetch listing '{}'", slug))))?
        .ok_or_else(|| AppError::NotFound(format!("No listing with slug '{}'", slug)))?;
    Ok(Json(car))
}

pub async fn get_facets(State(app_state): State<AppState>) -> AppResult<impl IntoResponse> {
    let cars = search_inventory(&app_state, &FilterSelection::default()).await?;
    Ok(Json(filters::facet_counts(&cars)))
}

pub async fn get_financing_quote(
    State(app_state): State<AppState>,
    Query(query): Query<FinancingQuery>,
) -> AppResult<impl IntoResponse> {
    let defaults = LoanRequest::with_defaults(query.price);
    let request = LoanRequest {
        price: query.price,
        down_payment: query.down_payment.unwrap_or(defaults.down_payment),
        term_months: query.term_months.unwrap_or(defaults.term_months),
        annual_rate_percent: query.annual_rate_percent.unwrap_or(defaults.annual_rate_percent),
    };
    tracing::debug!(?request, "Financing quote requested");

    let quote = request.quote()?;
    let currency = query.currency.as_deref().unwrap_or(&app_state.settings.default_currency);
    Ok(Json(FinancingResponse {
        request,
        quote,
        monthly_payment_label: format_price(quote.monthly_payment, currency),
        total_cost_label: format_price(quote.total_cost, currency),
    }))
}

pub async fn submit_inquiry(
    State(app_state): State<AppState>,
    JsonExtract(request): JsonExtract<InquiryRequest>,
) -> AppResult<impl IntoResponse> {
    tracing::info!("[HANDLER] /api/inquiries - {:?} inquiry received", request.inquiry_type);
    let inquiry = request.validate()?;

    app_state
        .backend
        .insert_inquiry(&inquiry)
        .await
        .map_err(|e| AppError::InternalServerError(e.context("Failed to save inquiry")))?;

    Ok(Json(GenericResponse {
        success: true,
        message: Some("Thank you. Our team will get back to you shortly.".to_string()),
        id: None,
    }))
}

pub async fn validate_trade_in_step(
    Path(step): Path<u8>,
    JsonExtract(form): JsonExtract<TradeInForm>,
) -> AppResult<impl IntoResponse> {
    let step = WizardStep::try_from(step)?;
    form.validate_step(step, chrono::Utc::now().year())?;
    Ok(Json(GenericResponse { success: true, message: None, id: None }))
}

pub async fn submit_trade_in(
    State(app_state): State<AppState>,
    JsonExtract(form): JsonExtract<TradeInForm>,
) -> AppResult<impl IntoResponse> {
    let lead = form.into_lead(chrono::Utc::now().year())?;
    tracing::info!("[HANDLER] /api/trade-in - Valuation request for {} {}", lead.brand, lead.model);

    let saved = app_state
        .backend
        .insert_lead(&lead)
        .await
        .map_err(|e| AppError::InternalServerError(e.context("Failed to save trade-in lead")))?;

    Ok(Json(GenericResponse {
        success: true,
        message: Some("Trade-in request received. We will contact you with a valuation.".to_string()),
        id: Some(saved.id),
    }))
}
