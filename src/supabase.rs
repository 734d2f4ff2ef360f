// Functions for talking to the managed backend's REST interface (PostgREST
// tables + RPC). Filtering pushed down here is re-checked in memory by the
// callers through `filters::apply_filters`.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::Settings;
use crate::filters::FilterSelection;
use crate::models::{
    Car, CarInput, CarStatus, Lead, LeadStatus, NewInquiry, NewLead, NewQrCode, Profile, QrCode,
};

const CARS_TABLE: &str = "cars_for_sale";
const QR_TABLE: &str = "qr_codes";
const LEADS_TABLE: &str = "car_purchase_requests";
const INQUIRIES_TABLE: &str = "inquiries";
const PROFILES_TABLE: &str = "profiles";
const INCREMENT_SCAN_RPC: &str = "increment_scan";

// Which key the Authorization header carries
#[derive(Clone, Debug, PartialEq)]
enum Credential {
    Anon,
    // Caller's JWT, so row-level policies apply to their requests
    User(String),
    Service,
}

#[derive(Clone)]
pub struct SupabaseClient {
    http: Arc<Client>,
    settings: Arc<Settings>,
    credential: Credential,
}

impl SupabaseClient {
    pub fn new(http: Arc<Client>, settings: Arc<Settings>) -> Self {
        SupabaseClient { http, settings, credential: Credential::Anon }
    }

    fn with_credential(&self, credential: Credential) -> Self {
        SupabaseClient {
            http: Arc::clone(&self.http),
            settings: Arc::clone(&self.settings),
            credential,
        }
    }

    pub fn with_access_token(&self, token: &str) -> Self {
        self.with_credential(Credential::User(token.to_string()))
    }

    /// Client for a verified staff member: the service key when one is
    /// configured, otherwise the staff member's own token.
    pub fn for_admin(&self, token: &str) -> Self {
        if self.settings.supabase_service_key.is_some() {
            self.with_credential(Credential::Service)
        } else {
            self.with_access_token(token)
        }
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.settings.supabase_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let anon = self.settings.supabase_anon_key.as_str();
        let bearer = match &self.credential {
            Credential::Anon => anon,
            Credential::User(token) => token.as_str(),
            Credential::Service => self.settings.supabase_service_key.as_deref().unwrap_or(anon),
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.settings.supabase_anon_key).context("Invalid anon key header value")?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", bearer)).context("Failed to create Authorization header")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        Ok(self.http.request(method, self.rest_url(path)).headers(self.headers()?))
    }

    async fn fetch_rows<T: DeserializeOwned>(&self, table: &str, query: &[(String, String)]) -> Result<Vec<T>> {
        tracing::debug!(table, ?query, "Backend select");
        let response = self
            .request(Method::GET, table)?
            .query(&[("select", "*")])
            .query(query)
            .send()
            .await
            .with_context(|| format!("Network error selecting from {}", table))?
            .error_for_status()
            .with_context(|| format!("Backend rejected select on {}", table))?;

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse rows from {}", table))
    }

    async fn write_rows<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        table: &str,
        query: &[(String, String)],
        body: &B,
    ) -> Result<Vec<T>> {
        let response = self
            .request(method.clone(), table)?
            .header("Prefer", "return=representation")
            .query(query)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Network error on {} {}", method, table))?
            .error_for_status()
            .with_context(|| format!("Backend rejected {} on {}", method, table))?;

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response from {}", method, table))
    }

    async fn delete_rows(&self, table: &str, id: &str) -> Result<bool> {
        let response = self
            .request(Method::DELETE, table)?
            .header("Prefer", "return=representation")
            .query(&[eq("id", id)])
            .send()
            .await
            .with_context(|| format!("Network error deleting from {}", table))?
            .error_for_status()
            .with_context(|| format!("Backend rejected delete on {}", table))?;

        let deleted: Vec<Value> = response.json().await.context("Failed to parse delete response")?;
        Ok(!deleted.is_empty())
    }

    // --- Inventory ---

    pub async fn list_cars(&self, selection: &FilterSelection, status: Option<CarStatus>) -> Result<Vec<Car>> {
        let mut query = selection.remote_query_params();
        if let Some(status) = status {
            query.push(eq("status", status.as_str()));
        }
        let cars: Vec<Car> = self.fetch_rows(CARS_TABLE, &query).await?;
        tracing::info!("Fetched {} listings from backend", cars.len());
        Ok(cars)
    }

    pub async fn get_car_by_slug(&self, slug: &str) -> Result<Option<Car>> {
        let rows: Vec<Car> = self.fetch_rows(CARS_TABLE, &[eq("slug", slug)]).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn get_car(&self, id: &str) -> Result<Option<Car>> {
        let rows: Vec<Car> = self.fetch_rows(CARS_TABLE, &[eq("id", id)]).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn create_car(&self, input: &CarInput) -> Result<Car> {
        let rows: Vec<Car> = self.write_rows(Method::POST, CARS_TABLE, &[], &[input]).await?;
        let car = rows.into_iter().next().context("Backend returned no row for created listing")?;
        tracing::info!("Created listing {} ({})", car.id, car.slug);
        Ok(car)
    }

    pub async fn update_car(&self, id: &str, input: &CarInput) -> Result<Option<Car>> {
        let rows: Vec<Car> = self.write_rows(Method::PATCH, CARS_TABLE, &[eq("id", id)], input).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn update_car_status(&self, id: &str, status: CarStatus) -> Result<Option<Car>> {
        let rows: Vec<Car> = self
            .write_rows(Method::PATCH, CARS_TABLE, &[eq("id", id)], &json!({ "status": status }))
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn delete_car(&self, id: &str) -> Result<bool> {
        self.delete_rows(CARS_TABLE, id).await
    }

    // --- QR campaigns ---

    pub async fn get_qr_code(&self, id: &str) -> Result<Option<QrCode>> {
        let rows: Vec<QrCode> = self.fetch_rows(QR_TABLE, &[eq("id", id)]).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn list_qr_codes(&self) -> Result<Vec<QrCode>> {
        self.fetch_rows(QR_TABLE, &[("order".to_string(), "created_at.desc".to_string())])
            .await
    }

    pub async fn create_qr_code(&self, code: &NewQrCode) -> Result<QrCode> {
        let rows: Vec<QrCode> = self.write_rows(Method::POST, QR_TABLE, &[], &[code]).await?;
        rows.into_iter().next().context("Backend returned no row for created QR code")
    }

    pub async fn delete_qr_code(&self, id: &str) -> Result<bool> {
        self.delete_rows(QR_TABLE, id).await
    }

    /// Counts one scan. Uses the atomic `increment_scan` function when the
    /// database provides it, otherwise writes back the incremented count.
    pub async fn record_qr_scan(&self, code: &QrCode) -> Result<()> {
        let response = self
            .request(Method::POST, &format!("rpc/{}", INCREMENT_SCAN_RPC))?
            .json(&json!({ "qr_id": code.id }))
            .send()
            .await
            .context("Network error calling increment_scan")?;

        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            response.error_for_status().context("Backend rejected increment_scan")?;
            return Ok(());
        }

        tracing::debug!(qr_id = %code.id, "increment_scan unavailable, falling back to read-write update");
        let _: Vec<QrCode> = self
            .write_rows(
                Method::PATCH,
                QR_TABLE,
                &[eq("id", &code.id)],
                &json!({ "scan_count": code.scan_count + 1 }),
            )
            .await?;
        Ok(())
    }

    // --- Leads & inquiries ---

    pub async fn insert_lead(&self, lead: &NewLead) -> Result<Lead> {
        let rows: Vec<Lead> = self.write_rows(Method::POST, LEADS_TABLE, &[], &[lead]).await?;
        rows.into_iter().next().context("Backend returned no row for created lead")
    }

    pub async fn list_leads(&self, limit: Option<usize>) -> Result<Vec<Lead>> {
        let mut query = vec![("order".to_string(), "created_at.desc".to_string())];
        if let Some(limit) = limit {
            query.push(("limit".to_string(), limit.to_string()));
        }
        self.fetch_rows(LEADS_TABLE, &query).await
    }

    pub async fn update_lead_status(&self, id: &str, status: LeadStatus) -> Result<Option<Lead>> {
        let rows: Vec<Lead> = self
            .write_rows(Method::PATCH, LEADS_TABLE, &[eq("id", id)], &json!({ "status": status }))
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn insert_inquiry(&self, inquiry: &NewInquiry) -> Result<()> {
        self.request(Method::POST, INQUIRIES_TABLE)?
            .header("Prefer", "return=minimal")
            .json(&[inquiry])
            .send()
            .await
            .context("Network error saving inquiry")?
            .error_for_status()
            .context("Backend rejected inquiry")?;
        Ok(())
    }

    // --- Staff ---

    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let rows: Vec<Profile> = self.fetch_rows(PROFILES_TABLE, &[eq("id", user_id)]).await?;
        Ok(rows.into_iter().next())
    }
}

fn eq(column: &str, value: &str) -> (String, String) {
    (column.to_string(), format!("eq.{}", value))
}
