use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::AppError;
use crate::models::UserId;
use crate::state::AppState;

const TOKEN_LIFETIME_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("malformed Authorization header")]
    MalformedHeader,
    #[error("{0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("token subject {0:?} is not a user id")]
    Subject(String),
    #[error("system clock before epoch")]
    Clock(#[from] std::time::SystemTimeError),
}

/// Account the request is made for, on login-required routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

/// Account the request is made for, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer(pub Option<UserId>);

impl Viewer {
    pub fn require(self) -> Result<UserId, AppError> {
        self.0.ok_or(AppError::Unauthenticated)
    }
}

pub fn create_token(user: UserId, jwt_secret: &str) -> Result<String, AuthError> {
    let expiration = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() + TOKEN_LIFETIME_SECS;
    let claims = Claims {
        sub: user.to_string(),
        exp: expiration as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn validate_token(token: &str, jwt_secret: &str) -> Result<UserId, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )?;
    let sub = token_data.claims.sub;
    sub.parse::<i64>()
        .map(UserId)
        .map_err(|_| AuthError::Subject(sub))
}

/// User named by the bearer token; `None` when no Authorization header is sent.
pub fn bearer_user(headers: &HeaderMap, jwt_secret: &str) -> Result<Option<UserId>, AuthError> {
    let Some(auth_header) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let token = auth_header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AuthError::MalformedHeader)?;
    validate_token(token.trim(), jwt_secret).map(Some)
}

/// Attaches the optional [`Viewer`]; a bad token is still rejected.
pub async fn identify(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let viewer = bearer_user(request.headers(), &state.config.jwt_secret)?;
    debug!("Request from {:?}", viewer);
    request.extensions_mut().insert(Viewer(viewer));
    Ok(next.run(request).await)
}

/// Login-required guard: attaches [`CurrentUser`] or answers 401.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = bearer_user(request.headers(), &state.config.jwt_secret)?
        .ok_or(AppError::Unauthenticated)?;
    info!("Authenticated user: {} for {}", user, request.uri().path());
    request.extensions_mut().insert(CurrentUser(user));
    request.extensions_mut().insert(Viewer(Some(user)));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_token_round_trip() {
        let token = create_token(UserId(42), "secret").unwrap();
        assert_eq!(validate_token(&token, "secret").unwrap(), UserId(42));
        assert!(validate_token(&token, "other").is_err());
    }

    #[test]
    fn test_bearer_user_header_handling() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_user(&headers, "secret").unwrap(), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(
            bearer_user(&headers, "secret"),
            Err(AuthError::MalformedHeader)
        ));

        let token = create_token(UserId(7), "secret").unwrap();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        assert_eq!(bearer_user(&headers, "secret").unwrap(), Some(UserId(7)));
    }
}
