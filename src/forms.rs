// Validation for customer-submitted forms: vehicle inquiries and the
// three-step trade-in wizard.

use serde::Deserialize;
use thiserror::Error;

use crate::models::{InquiryType, LeadStatus, NewInquiry, NewLead};

// The trade-in wizard offers the last 30 model years
pub const TRADE_IN_YEAR_SPAN: i32 = 30;

#[derive(Debug, Error, PartialEq)]
pub enum FormError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid email format")]
    InvalidEmail,
    #[error("year {year} is outside {min}..={max}")]
    YearOutOfRange { year: i32, min: i32, max: i32 },
    #[error("unknown wizard step {0}")]
    UnknownStep(u8),
}

pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

fn required(value: &Option<String>, field: &'static str) -> Result<String, FormError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(FormError::Missing(field))
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InquiryRequest {
    #[serde(default)]
    pub car_id: Option<String>,
    pub inquiry_type: InquiryType,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub preferred_date: Option<String>,
    #[serde(default)]
    pub preferred_time: Option<String>,
    #[serde(default)]
    pub monthly_budget: Option<f64>,
    #[serde(default)]
    pub down_payment: Option<f64>,
    #[serde(default)]
    pub trade_in_brand: Option<String>,
    #[serde(default)]
    pub trade_in_model: Option<String>,
    #[serde(default)]
    pub trade_in_year: Option<i32>,
    #[serde(default)]
    pub trade_in_mileage: Option<u32>,
}

impl InquiryRequest {
    pub fn validate(self) -> Result<NewInquiry, FormError> {
        let customer_name = required(&self.name, "name")?;
        let email = required(&self.email, "email")?;
        if !is_valid_email(&email) {
            return Err(FormError::InvalidEmail);
        }
        if self.inquiry_type == InquiryType::TestDrive {
            required(&self.preferred_date, "preferred date")?;
            required(&self.phone, "phone")?;
        }

        Ok(NewInquiry {
            car_id: optional(self.car_id),
            inquiry_type: self.inquiry_type,
            customer_name,
            email,
            phone: optional(self.phone),
            message: optional(self.message),
            preferred_date: optional(self.preferred_date),
            preferred_time: optional(self.preferred_time),
            monthly_budget: self.monthly_budget,
            down_payment: self.down_payment,
            trade_in_brand: optional(self.trade_in_brand),
            trade_in_model: optional(self.trade_in_model),
            trade_in_year: self.trade_in_year,
            trade_in_mileage: self.trade_in_mileage,
            status: LeadStatus::New,
        })
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VehicleCondition {
    Excellent,
    VeryGood,
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccidentHistory {
    None,
    Minor,
    Major,
    Unrepaired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    Vehicle,
    Condition,
    Contact,
}

impl TryFrom<u8> for WizardStep {
    type Error = FormError;

    fn try_from(step: u8) -> Result<Self, Self::Error> {
        match step {
            1 => Ok(WizardStep::Vehicle),
            2 => Ok(WizardStep::Condition),
            3 => Ok(WizardStep::Contact),
            other => Err(FormError::UnknownStep(other)),
        }
    }
}

/// Everything the trade-in wizard collects across its three steps.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TradeInForm {
    // Step 1: vehicle
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub body_type: Option<String>,
    pub fuel_type: Option<String>,
    pub transmission: Option<String>,
    pub mileage: Option<u32>,
    pub exterior_color: Option<String>,
    pub interior_color: Option<String>,
    // Step 2: condition
    pub condition: Option<VehicleCondition>,
    pub accident_history: Option<AccidentHistory>,
    pub service_history: Option<String>,
    pub modifications: Option<String>,
    pub issues: Option<String>,
    // Step 3: contact
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub preferred_contact: Option<String>,
    pub notes: Option<String>,
    pub expected_price: Option<f64>,
}

impl TradeInForm {
    pub fn validate_step(&self, step: WizardStep, current_year: i32) -> Result<(), FormError> {
        match step {
            WizardStep::Vehicle => {
                required(&self.brand, "brand")?;
                required(&self.model, "model")?;
                let year = self.year.ok_or(FormError::Missing("year"))?;
                let min = current_year - (TRADE_IN_YEAR_SPAN - 1);
                if year < min || year > current_year {
                    return Err(FormError::YearOutOfRange { year, min, max: current_year });
                }
                self.mileage.ok_or(FormError::Missing("mileage"))?;
            }
            WizardStep::Condition => {
                self.condition.ok_or(FormError::Missing("condition"))?;
                self.accident_history.ok_or(FormError::Missing("accident history"))?;
            }
            WizardStep::Contact => {
                required(&self.first_name, "first name")?;
                required(&self.last_name, "last name")?;
                let email = required(&self.email, "email")?;
                if !is_valid_email(&email) {
                    return Err(FormError::InvalidEmail);
                }
                required(&self.phone, "phone")?;
            }
        }
        Ok(())
    }

    /// Validates all steps and turns the submission into a purchase lead.
    pub fn into_lead(self, current_year: i32) -> Result<NewLead, FormError> {
        for step in [WizardStep::Vehicle, WizardStep::Condition, WizardStep::Contact] {
            self.validate_step(step, current_year)?;
        }

        let notes = self.summary();
        Ok(NewLead {
            brand: required(&self.brand, "brand")?,
            model: required(&self.model, "model")?,
            year: self.year,
            mileage: self.mileage,
            status: LeadStatus::New,
            expected_price: self.expected_price.filter(|p| p.is_finite() && *p >= 0.0).unwrap_or(0.0),
            owner_firstname: required(&self.first_name, "first name")?,
            owner_lastname: required(&self.last_name, "last name")?,
            email: optional(self.email),
            phone: optional(self.phone),
            notes: (!notes.is_empty()).then_some(notes),
        })
    }

    // Free-form details that have no column of their own
    fn summary(&self) -> String {
        let mut lines = Vec::new();
        let mut add = |label: &str, value: Option<String>| {
            if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                lines.push(format!("{}: {}", label, value.trim()));
            }
        };
        add("Body type", self.body_type.clone());
        add("Fuel type", self.fuel_type.clone());
        add("Transmission", self.transmission.clone());
        add("Exterior colour", self.exterior_color.clone());
        add("Interior colour", self.interior_color.clone());
        add("Condition", self.condition.map(|c| format!("{:?}", c)));
        add("Accident history", self.accident_history.map(|a| format!("{:?}", a)));
        add("Service history", self.service_history.clone());
        add("Modifications", self.modifications.clone());
        add("Known issues", self.issues.clone());
        add("Preferred contact", self.preferred_contact.clone());
        add("Notes", self.notes.clone());
        lines.join("\n")
    }
}
