//! Authentication extractor.
//!
//! Clients present the shared secret as a Bearer token. With no
//! `AUTH_SECRET` configured every request is accepted as anonymous.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};

use crate::AppState;

/// Authenticated caller extracted from a request.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    /// The presented bearer token, or `anonymous`
    pub token: String,
}

impl AuthUser {
    pub fn is_anonymous(&self) -> bool {
        self.token == "anonymous"
    }
}

/// Check an `Authorization` header value against the configured secret.
pub fn authorize(
    header: Option<&str>,
    secret: Option<&str>,
) -> Result<AuthUser, (StatusCode, &'static str)> {
    match (header, secret) {
        (None, None) => Ok(AuthUser {
            token: "anonymous".to_string(),
        }),
        (None, Some(_)) => Err((StatusCode::UNAUTHORIZED, "Missing authorization header")),
        (Some(header), secret) => {
            let token = header.strip_prefix("Bearer ").ok_or((
                StatusCode::UNAUTHORIZED,
                "Invalid authorization header format",
            ))?;

            if token.is_empty() {
                return Err((StatusCode::UNAUTHORIZED, "Empty bearer token"));
            }

            match secret {
                Some(secret) if token != secret => {
                    Err((StatusCode::UNAUTHORIZED, "Invalid bearer token"))
                }
                _ => Ok(AuthUser {
                    token: token.to_string(),
                }),
            }
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        authorize(header, state.config.auth_secret.as_deref()).inspect_err(|(_, reason)| {
            tracing::debug!(reason = %reason, "Rejected request");
        })
    }
}
