use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tracing::{error, info, warn};

use crate::{config::Settings, error::AppError, models::Role, AppState};

// Audience the backend stamps on signed-in user tokens
const AUTHENTICATED_AUDIENCE: &str = "authenticated";

// --- Structs for Claims ---

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub exp: usize,
    #[serde(default)]
    pub aud: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

// --- Role Caching ---

#[derive(Clone, Copy)]
struct CachedRole {
    role: Role,
    fetched_at: Instant,
}

// Profile roles rarely change; cache them per user to avoid a lookup per admin request
static ROLE_CACHE: Lazy<tokio::sync::RwLock<HashMap<String, CachedRole>>> =
    Lazy::new(|| tokio::sync::RwLock::new(HashMap::new()));

async fn cached_role(user_id: &str, ttl: Duration) -> Option<Role> {
    let read_guard = ROLE_CACHE.read().await;
    read_guard
        .get(user_id)
        .filter(|cached| cached.fetched_at.elapsed() < ttl)
        .map(|cached| cached.role)
}

async fn remember_role(user_id: &str, role: Role, ttl: Duration) {
    let mut write_guard = ROLE_CACHE.write().await;
    prune_expired(&mut write_guard, ttl);
    write_guard.insert(user_id.to_string(), CachedRole { role, fetched_at: Instant::now() });
}

fn prune_expired(cache: &mut HashMap<String, CachedRole>, ttl: Duration) {
    cache.retain(|_, cached| cached.fetched_at.elapsed() < ttl);
}

// --- Token Verification ---

pub fn verify_token(token: &str, settings: &Settings) -> Result<Claims, AppError> {
    if settings.supabase_jwt_secret.is_empty() {
        error!("JWT secret not configured in settings.");
        return Err(AppError::InternalServerError(anyhow::anyhow!("Missing JWT secret configuration")));
    }

    let decoding_key = DecodingKey::from_secret(settings.supabase_jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[AUTHENTICATED_AUDIENCE]);

    let decoded = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        warn!("Token validation failed: {}", e);
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::Unauthorized("Token expired".into()),
            jsonwebtoken::errors::ErrorKind::InvalidAudience => AppError::Unauthorized("Invalid token audience".into()),
            _ => AppError::Unauthorized("Invalid token".into()),
        }
    })?;

    Ok(decoded.claims)
}

// --- Axum Extractors ---

/// Any signed-in user.
#[derive(Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: Option<String>,
    // Forwarded to the backend so its row-level policies see the same user
    pub access_token: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|e| {
                warn!("Failed to extract Authorization header: {}", e);
                AppError::Unauthorized("Missing or invalid Authorization header".into())
            })?;

        let app_state = AppState::from_ref(state);
        let claims = verify_token(bearer.token(), &app_state.settings)?;

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            email: claims.email,
            access_token: bearer.token().to_string(),
        })
    }
}

/// A signed-in staff member (owner or worker).
#[derive(Clone)]
pub struct AdminUser {
    pub user: AuthenticatedUser,
    pub role: Role,
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        let app_state = AppState::from_ref(state);
        let ttl = Duration::from_secs(app_state.settings.role_cache_ttl_secs);

        let role = match cached_role(&user.user_id, ttl).await {
            Some(role) => role,
            None => {
                let profile = app_state
                    .backend
                    .with_access_token(&user.access_token)
                    .get_profile(&user.user_id)
                    .await
                    .map_err(AppError::InternalServerError)?;
                let role = profile.map_or(Role::Customer, |p| p.role);
                remember_role(&user.user_id, role, ttl).await;
                role
            }
        };

        if !role.is_admin() {
            warn!("User {} with role {:?} tried to reach the admin area", user.user_id, role);
            return Err(AppError::Forbidden("Admin access required".into()));
        }

        info!(
            "Admin access granted to {} ({:?})",
            user.email.as_deref().unwrap_or(&user.user_id),
            role
        );
        Ok(AdminUser { user, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_settings;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, aud: &str, exp_offset: i64) -> String {
        let claims = Claims {
            sub: "user-1".into(),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
            aud: Some(aud.into()),
            email: Some("staff@example.ch".into()),
            role: Some("authenticated".into()),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn accepts_tokens_signed_with_the_project_secret() {
        let settings = test_settings();
        let claims = verify_token(&token(&settings.supabase_jwt_secret, "authenticated", 3600), &settings).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email.as_deref(), Some("staff@example.ch"));
    }

    #[test]
    fn rejects_foreign_signatures_and_audiences() {
        let settings = test_settings();
        assert!(matches!(
            verify_token(&token("another-secret", "authenticated", 3600), &settings),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            verify_token(&token(&settings.supabase_jwt_secret, "anon", 3600), &settings),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn rejects_expired_tokens() {
        let settings = test_settings();
        match verify_token(&token(&settings.supabase_jwt_secret, "authenticated", -3600), &settings) {
            Err(AppError::Unauthorized(message)) => assert_eq!(message, "Token expired"),
            _ => panic!("expired token accepted"),
        }
    }

    #[tokio::test]
    async fn role_cache_honours_ttl() {
        remember_role("cache-user", Role::Worker, Duration::from_secs(60)).await;
        assert_eq!(cached_role("cache-user", Duration::from_secs(60)).await, Some(Role::Worker));
        assert_eq!(cached_role("cache-user", Duration::ZERO).await, None);
        assert_eq!(cached_role("someone-else", Duration::from_secs(60)).await, None);
    }

    #[test]
    fn expired_roles_are_pruned() {
        let ttl = Duration::from_secs(60);
        let stale = Instant::now().checked_sub(Duration::from_secs(120)).unwrap();
        let mut cache = HashMap::from([
            ("stale".to_string(), CachedRole { role: Role::Owner, fetched_at: stale }),
            ("fresh".to_string(), CachedRole { role: Role::Worker, fetched_at: Instant::now() }),
        ]);

        prune_expired(&mut cache, ttl);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key("fresh"));
    }
}
