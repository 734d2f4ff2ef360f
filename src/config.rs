// Application settings, layered: defaults -> config.toml -> APP_* environment variables

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server_address: String,
    // Managed backend (REST database + storage)
    pub supabase_url: String,
    pub supabase_anon_key: String,
    // Used for staff requests when present, otherwise the staff member's token is forwarded
    pub supabase_service_key: Option<String>,
    pub supabase_jwt_secret: String,
    // Absolute origin used when building QR scan links
    pub public_base_url: String,
    pub storage_bucket: String,
    pub default_currency: String,
    pub role_cache_ttl_secs: u64,
}

impl Settings {
    pub fn new() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let builder = Config::builder()
            .set_default("server_address", "127.0.0.1:3000")?
            .set_default("supabase_url", "http://localhost:54321")?
            .set_default("supabase_anon_key", "")?
            .set_default("supabase_jwt_secret", "")?
            .set_default("public_base_url", "http://localhost:3000")?
            .set_default("storage_bucket", "car-images")?
            .set_default("default_currency", "CHF")?
            .set_default("role_cache_ttl_secs", 300)?
            .add_source(File::with_name("config").required(false))
            // e.g. APP_SUPABASE_URL, APP_SUPABASE_JWT_SECRET
            .add_source(Environment::with_prefix("APP").try_parsing(true));

        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    // Absolute URL a relative in-app path resolves to
    pub fn public_url(&self, path: &str) -> String {
        let base = self.public_base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    // Public storage URL for an image reference; absolute URLs pass through unchanged
    pub fn image_url(&self, reference: &str) -> String {
        if reference.starts_with("http") {
            return reference.to_string();
        }
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.supabase_url.trim_end_matches('/'),
            self.storage_bucket,
            reference.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
pub(crate) fn test_settings() -> Settings {
    Settings {
        server_address: "127.0.0.1:0".to_string(),
        supabase_url: "https://db.example.test/".to_string(),
        supabase_anon_key: "anon".to_string(),
        supabase_service_key: None,
        supabase_jwt_secret: "super-secret-jwt-token-for-tests".to_string(),
        public_base_url: "https://cars.example.test".to_string(),
        storage_bucket: "car-images".to_string(),
        default_currency: "CHF".to_string(),
        role_cache_ttl_secs: 300,
    }
}
