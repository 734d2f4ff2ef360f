// Data structures shared by the pipeline, the backend client and the handlers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CarStatus {
    #[default]
    Available,
    Reserved,
    Sold,
    ComingSoon,
}

impl CarStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarStatus::Available => "available",
            CarStatus::Reserved => "reserved",
            CarStatus::Sold => "sold",
            CarStatus::ComingSoon => "coming_soon",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
    #[default]
    Fixed,
    Negotiable,
    UponRequest,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    New,
    Used,
    CertifiedPreOwned,
}

/// A vehicle listing as stored in the `cars_for_sale` table.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Car {
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub title: Option<String>,
    pub brand: String,
    pub model: String,
    #[serde(default)]
    pub variant: Option<String>,
    pub year: i32,
    pub price: f64,
    // Previous price when the listing is discounted
    #[serde(default)]
    pub original_price: Option<f64>,
    pub currency: String,
    #[serde(default)]
    pub price_type: PriceType,
    // Absent for new cars
    #[serde(default)]
    pub mileage: Option<u32>,
    #[serde(default)]
    pub body_type: Option<String>,
    #[serde(default)]
    pub fuel_type: Option<String>,
    #[serde(default)]
    pub transmission: Option<String>,
    #[serde(default)]
    pub drive_type: Option<String>,
    #[serde(default)]
    pub exterior_color: Option<String>,
    #[serde(default)]
    pub interior_color: Option<String>,
    #[serde(default)]
    pub engine_cc: Option<u32>,
    #[serde(default)]
    pub power_hp: Option<u32>,
    #[serde(default)]
    pub doors: Option<u8>,
    pub status: CarStatus,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Car {
    /// Odometer reading used for range matching and sorting. A listing without
    /// a reading is a new car and counts as 0 km.
    pub fn odometer(&self) -> u32 {
        self.mileage.unwrap_or(0)
    }

    pub fn is_on_sale(&self) -> bool {
        self.original_price.is_some_and(|original| original > self.price)
    }

    pub fn display_name(&self) -> String {
        format!("{} {} {}", self.year, self.brand, self.model)
    }
}

/// Admin form payload for creating or replacing a listing.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CarInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub brand: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub year: i32,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default)]
    pub price_type: PriceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mileage: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmission: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exterior_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interior_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_cc: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_hp: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doors: Option<u8>,
    #[serde(default)]
    pub status: CarStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
}

impl CarInput {
    /// Fills in the derived fields a new listing needs: the slug when the admin
    /// left it blank and the currency when none was chosen.
    pub fn prepare_for_create(mut self, default_currency: &str) -> Self {
        let needs_slug = self.slug.as_deref().map_or(true, |s| s.trim().is_empty());
        if needs_slug {
            self.slug = Some(slugify(&format!("{}-{}-{}", self.brand, self.model, self.year)));
        }
        if self.currency.as_deref().map_or(true, str::is_empty) {
            self.currency = Some(default_currency.to_string());
        }
        if self.title.is_none() {
            self.title = Some(format!("{} {}", self.brand, self.model));
        }
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate<S> {
    pub status: S,
}

// Lower-cases and collapses every run of characters outside [a-z0-9] into '-'
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

// "CHF 1'250'000" style display price
pub fn format_price(amount: f64, currency: &str) -> String {
    let rounded = amount.round();
    let negative = rounded < 0.0;
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('\'');
        }
        grouped.push(c);
    }
    if negative {
        format!("{} -{}", currency, grouped)
    } else {
        format!("{} {}", currency, grouped)
    }
}

pub fn format_mileage(mileage: Option<u32>) -> String {
    match mileage {
        Some(km) if km > 0 => format!("{} km", format_price(km as f64, "").trim_start()),
        _ => "New".to_string(),
    }
}

// --- QR campaigns ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QrCode {
    pub id: String,
    pub label: String,
    pub target_url: String,
    pub scan_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct NewQrCode {
    pub label: String,
    pub target_url: String,
    pub scan_count: i64,
}

// --- Leads & inquiries ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Reviewed,
    Accepted,
    Rejected,
}

/// A purchase request for a customer's car (trade-in), `car_purchase_requests`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Lead {
    pub id: String,
    pub brand: String,
    pub model: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub mileage: Option<u32>,
    pub status: LeadStatus,
    pub expected_price: f64,
    pub owner_firstname: String,
    pub owner_lastname: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Clone)]
pub struct NewLead {
    pub brand: String,
    pub model: String,
    pub year: Option<i32>,
    pub mileage: Option<u32>,
    pub status: LeadStatus,
    pub expected_price: f64,
    pub owner_firstname: String,
    pub owner_lastname: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InquiryType {
    General,
    TestDrive,
    Financing,
    TradeIn,
}

/// Row written to the `inquiries` table.
#[derive(Debug, Serialize, Clone)]
pub struct NewInquiry {
    pub car_id: Option<String>,
    pub inquiry_type: InquiryType,
    pub customer_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub preferred_date: Option<String>,
    pub preferred_time: Option<String>,
    pub monthly_budget: Option<f64>,
    pub down_payment: Option<f64>,
    pub trade_in_brand: Option<String>,
    pub trade_in_model: Option<String>,
    pub trade_in_year: Option<i32>,
    pub trade_in_mileage: Option<u32>,
    pub status: LeadStatus,
}

// --- Staff profiles ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Worker,
    #[serde(other)]
    Customer,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Owner | Role::Worker)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Profile {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}
