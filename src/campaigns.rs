// QR campaign helpers: building new codes, scan links and redirect targets

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::{
    config::Settings,
    forms::FormError,
    models::{Car, NewQrCode, QrCode},
};

const QR_IMAGE_ENDPOINT: &str = "https://api.qrserver.com/v1/create-qr-code/";
const UNTITLED_LABEL: &str = "Untitled QR";

/// Admin request for a new code: either points at a listing or at a custom target.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewQrRequest {
    #[serde(default)]
    pub car_id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
}

impl NewQrRequest {
    pub fn resolve(self, car: Option<&Car>) -> Result<NewQrCode, FormError> {
        let label = self.label.map(|l| l.trim().to_string()).filter(|l| !l.is_empty());

        let (target_url, label) = match car {
            Some(car) => (
                format!("/cars/{}", car.slug),
                label.unwrap_or_else(|| car.display_name()),
            ),
            None => {
                let target = self
                    .target_url
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .ok_or(FormError::Missing("target url"))?;
                (target, label.unwrap_or_else(|| UNTITLED_LABEL.to_string()))
            }
        };

        Ok(NewQrCode { label, target_url, scan_count: 0 })
    }
}

/// A code as shown in the admin list, with its printable links.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCodeView {
    #[serde(flatten)]
    pub code: QrCode,
    pub scan_url: String,
    pub image_url: String,
}

impl QrCodeView {
    pub fn new(code: QrCode, settings: &Settings) -> Self {
        let scan_url = scan_link(settings, &code.id);
        let image_url = qr_image_url(&scan_url);
        QrCodeView { code, scan_url, image_url }
    }
}

pub fn scan_link(settings: &Settings, id: &str) -> String {
    settings.public_url(&format!("/qr/{}", id))
}

pub fn qr_image_url(data: &str) -> String {
    let params = [
        ("size", "300x300"),
        ("data", data),
        ("bgcolor", "000000"),
        ("color", "E8FF00"),
        ("margin", "10"),
    ];
    match Url::parse_with_params(QR_IMAGE_ENDPOINT, &params) {
        Ok(url) => url.to_string(),
        Err(e) => {
            tracing::warn!("Failed to build QR image URL: {}", e);
            QR_IMAGE_ENDPOINT.to_string()
        }
    }
}

/// Where a scan should land: absolute targets as-is, in-app paths under the
/// public origin.
pub fn redirect_target(settings: &Settings, target_url: &str) -> String {
    if target_url.starts_with("http") {
        target_url.to_string()
    } else {
        settings.public_url(target_url)
    }
}

pub fn total_scans(codes: &[QrCode]) -> i64 {
    codes.iter().map(|c| c.scan_count).sum()
}
