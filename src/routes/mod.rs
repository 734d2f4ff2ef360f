// Route definitions

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};

use crate::AppState;

mod admin;
mod api;
mod pages;

pub fn create_router(app_state: AppState) -> Router {
    // Staff back-office; every handler requires an owner/worker token
    let admin_router = Router::new()
        .route("/dashboard", get(admin::dashboard))
        .route("/cars", get(admin::list_cars).post(admin::create_car))
        .route("/cars/:id", put(admin::update_car).delete(admin::delete_car))
        .route("/cars/:id/status", patch(admin::update_car_status))
        .route("/qr-codes", get(admin::list_qr_codes).post(admin::create_qr_code))
        .route("/qr-codes/:id", delete(admin::delete_qr_code))
        .route("/leads", get(admin::list_leads))
        .route("/leads/:id/status", patch(admin::update_lead_status));

    let api_router = Router::new()
        .route("/cars", get(api::list_cars))
        .route("/cars/:slug", get(api::get_car))
        .route("/export/cars.csv", get(api::export_cars))
        .route("/facets", get(api::get_facets))
        .route("/financing", get(api::get_financing_quote))
        .route("/inquiries", post(api::submit_inquiry))
        .route("/trade-in", post(api::submit_trade_in))
        .route("/trade-in/steps/:step", post(api::validate_trade_in_step))
        .nest("/admin", admin_router);

    Router::new()
        .route("/", get(pages::inventory_page))
        .route("/inventory", get(pages::inventory_page))
        .route("/cars/:slug", get(pages::car_page))
        .route("/qr/:id", get(pages::qr_redirect))
        .nest("/api", api_router)
        .with_state(app_state)
}
