use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use marquee_core::{Actor, Role};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    /// `customer`, `theater_manager` or `admin`.
    pub role: String,
    pub exp: usize,
}

/// Resolves the bearer token into an [`Actor`] request extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Unauthorized(format!("invalid token: {}", e)))?;

    let role: Role = token_data.claims.role.parse().map_err(AppError::Forbidden)?;
    req.extensions_mut().insert(Actor::new(token_data.claims.sub, role));

    Ok(next.run(req).await)
}

/// HS256 token for `user_id`, valid for `ttl`.
pub fn issue_token(secret: &str, user_id: &str, role: Role, ttl: Duration) -> Result<String, jsonwebtoken::errors::Error> {
    let role = match role {
        Role::Customer => "customer",
        Role::TheaterManager => "theater_manager",
        Role::Admin => "admin",
    };
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: (Utc::now() + ttl).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}
