// Handlers for the staff back-office. Every handler takes an `AdminUser`, so
// requests without an owner/worker token never reach the backend.

use axum::{
    extract::{Json as JsonExtract, Path, Query, State},
    response::{IntoResponse, Json},
};
use serde::Serialize;

use crate::{
    auth_middleware::AdminUser,
    campaigns::{self, NewQrRequest, QrCodeView},
    error::{AppError, AppResult},
    filters::{apply_filters, FilterSelection, QueryMap},
    models::{Car, CarInput, CarStatus, Lead, LeadStatus, QrCode, StatusUpdate},
    AppState,
};

use super::api::GenericResponse;

const RECENT_LEADS: usize = 5;

#[derive(Serialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_cars: usize,
    pub available: usize,
    pub reserved: usize,
    pub sold: usize,
    pub coming_soon: usize,
    // Sum of asking prices of cars still for sale
    pub inventory_value: f64,
    pub qr_codes: usize,
    pub total_scans: i64,
}

pub fn dashboard_stats(cars: &[Car], codes: &[QrCode]) -> DashboardStats {
    let mut stats = DashboardStats {
        total_cars: cars.len(),
        qr_codes: codes.len(),
        total_scans: campaigns::total_scans(codes),
        ..Default::default()
    };
    for car in cars {
        match car.status {
            CarStatus::Available => {
                stats.available += 1;
                stats.inventory_value += car.price;
            }
            CarStatus::Reserved => stats.reserved += 1,
            CarStatus::Sold => stats.sold += 1,
            CarStatus::ComingSoon => stats.coming_soon += 1,
        }
    }
    stats
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DashboardResponse {
    stats: DashboardStats,
    recent_leads: Vec<Lead>,
}

pub async fn dashboard(State(app_state): State<AppState>, admin: AdminUser) -> AppResult<impl IntoResponse> {
    tracing::info!("[HANDLER] /api/admin/dashboard - Requested by {} ({:?})", admin.user.user_id, admin.role);
    let backend = app_state.backend.for_admin(&admin.user.access_token);
    let all = FilterSelection::default();

    let (cars, recent_leads, codes) = futures::try_join!(
        backend.list_cars(&all, None),
        backend.list_leads(Some(RECENT_LEADS)),
        backend.list_qr_codes(),
    )
    .map_err(|e| AppError::InternalServerError(e.context("Failed to load dashboard data")))?;

    Ok(Json(DashboardResponse {
        stats: dashboard_stats(&cars, &codes),
        recent_leads,
    }))
}

// --- Inventory ---

pub async fn list_cars(
    State(app_state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<QueryMap>,
) -> AppResult<impl IntoResponse> {
    let selection = FilterSelection::from_query(&query);
    let cars = app_state
        .backend
        .for_admin(&admin.user.access_token)
        .list_cars(&selection, None)
        .await
        .map_err(|e| AppError::InternalServerError(e.context("Failed to fetch inventory for admin")))?;
    Ok(Json(apply_filters(&selection, cars)))
}

pub async fn create_car(
    State(app_state): State<AppState>,
    admin: AdminUser,
    JsonExtract(input): JsonExtract<CarInput>,
) -> AppResult<impl IntoResponse> {
    let input = input.prepare_for_create(&app_state.settings.default_currency);
    tracing::info!("[HANDLER] /api/admin/cars - {} creating {:?}", admin.user.user_id, input.slug);

    let car = app_state
        .backend
        .for_admin(&admin.user.access_token)
        .create_car(&input)
        .await
        .map_err(|e| AppError::InternalServerError(e.context("Failed to create listing")))?;
    Ok(Json(car))
}

pub async fn update_car(
    State(app_state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
    JsonExtract(input): JsonExtract<CarInput>,
) -> AppResult<impl IntoResponse> {
    tracing::info!("[HANDLER] /api/admin/cars/:id - {} updating {}", admin.user.user_id, id);
    let car = app_state
        .backend
        .for_admin(&admin.user.access_token)
        .update_car(&id, &input)
        .await
        .map_err(|e| AppError::InternalServerError(e.context(format!("Failed to update listing {}", id))))?
        .ok_or_else(|| AppError::NotFound(format!("No listing with id '{}'", id)))?;
    Ok(Json(car))
}

pub async fn update_car_status(
    State(app_state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
    JsonExtract(update): JsonExtract<StatusUpdate<CarStatus>>,
) -> AppResult<impl IntoResponse> {
    tracing::info!("[HANDLER] /api/admin/cars/:id/status - {} -> {:?}", id, update.status);
    let car = app_state
        .backend
        .for_admin(&admin.user.access_token)
        .update_car_status(&id, update.status)
        .await
        .map_err(|e| AppError::InternalServerError(e.context("Failed to change listing status")))?
        .ok_or_else(|| AppError::NotFound(format!("No listing with id '{}'", id)))?;
    Ok(Json(car))
}

pub async fn delete_car(
    State(app_state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    tracing::info!("[HANDLER] /api/admin/cars/:id - {} deleting {}", admin.user.user_id, id);
    let deleted = app_state
        .backend
        .for_admin(&admin.user.access_token)
        .delete_car(&id)
        .await
        .map_err(|e| AppError::InternalServerError(e.context("Failed to delete listing")))?;
    if !deleted {
        return Err(AppError::NotFound(format!("No listing with id '{}'", id)));
    }
    Ok(Json(GenericResponse {
        success: true,
        message: Some("Listing deleted.".to_string()),
        id: Some(id),
    }))
}

// --- QR campaigns ---

pub async fn list_qr_codes(State(app_state): State<AppState>, admin: AdminUser) -> AppResult<impl IntoResponse> {
    let codes = app_state
        .backend
        .for_admin(&admin.user.access_token)
        .list_qr_codes()
        .await
        .map_err(|e| AppError::InternalServerError(e.context("Failed to fetch QR codes")))?;
    let views: Vec<QrCodeView> = codes
        .into_iter()
        .map(|code| QrCodeView::new(code, &app_state.settings))
        .collect();
    Ok(Json(views))
}

pub async fn create_qr_code(
    State(app_state): State<AppState>,
    admin: AdminUser,
    JsonExtract(request): JsonExtract<NewQrRequest>,
) -> AppResult<impl IntoResponse> {
    let backend = app_state.backend.for_admin(&admin.user.access_token);

    let car = match request.car_id.as_deref().filter(|id| !id.is_empty()) {
        Some(car_id) => Some(
            backend
                .get_car(car_id)
                .await
                .map_err(|e| AppError::InternalServerError(e.context("Failed to look up listing for QR code")))?
                .ok_or_else(|| AppError::BadRequest(format!("No listing with id '{}'", car_id)))?,
        ),
        None => None,
    };

    let new_code = request.resolve(car.as_ref())?;
    let code = backend
        .create_qr_code(&new_code)
        .await
        .map_err(|e| AppError::InternalServerError(e.context("Failed to create QR code")))?;
    tracing::info!("[HANDLER] /api/admin/qr-codes - Created '{}' -> {}", code.label, code.target_url);

    Ok(Json(QrCodeView::new(code, &app_state.settings)))
}

pub async fn delete_qr_code(
    State(app_state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let deleted = app_state
        .backend
        .for_admin(&admin.user.access_token)
        .delete_qr_code(&id)
        .await
        .map_err(|e| AppError::InternalServerError(e.context("Failed to delete QR code")))?;
    if !deleted {
        return Err(AppError::NotFound(format!("No QR code with id '{}'", id)));
    }
    Ok(Json(GenericResponse { success: true, message: None, id: Some(id) }))
}

// --- Leads ---

pub async fn list_leads(State(app_state): State<AppState>, admin: AdminUser) -> AppResult<impl IntoResponse> {
    let leads = app_state
        .backend
        .for_admin(&admin.user.access_token)
        .list_leads(None)
        .await
        .map_err(|e| AppError::InternalServerError(e.context("Failed to fetch leads")))?;
    Ok(Json(leads))
}

pub async fn update_lead_status(
    State(app_state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
    JsonExtract(update): JsonExtract<StatusUpdate<LeadStatus>>,
) -> AppResult<impl IntoResponse> {
    let lead = app_state
        .backend
        .for_admin(&admin.user.access_token)
        .update_lead_status(&id, update.status)
        .await
        .map_err(|e| AppError::InternalServerError(e.context("Failed to change lead status")))?
        .ok_or_else(|| AppError::NotFound(format!("No lead with id '{}'", id)))?;
    Ok(Json(lead))
}
