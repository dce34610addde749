//! CSRF tokens for the AJAX endpoints
//!
//! The token is the hex HMAC-SHA256 of the session token under the
//! configured secret. Pages receive it as `csrf_token`; scripts send it back
//! in the `X-CSRF-Token` header.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::api::middleware::{ApiError, AppState, SessionToken};

pub const CSRF_HEADER: &str = "x-csrf-token";

type HmacSha256 = Hmac<Sha256>;

fn mac(secret: &str, session_token: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(session_token.as_bytes());
    Some(mac)
}

/// Token for a session
pub fn csrf_token(secret: &str, session_token: &str) -> String {
    match mac(secret, session_token) {
        Some(mac) => HEXLOWER.encode(&mac.finalize().into_bytes()),
        None => String::new(),
    }
}

/// Constant-time check of a submitted token
pub fn verify_csrf_token(secret: &str, session_token: &str, submitted: &str) -> bool {
    let Ok(bytes) = HEXLOWER.decode(submitted.trim().to_ascii_lowercase().as_bytes()) else {
        return false;
    };
    match mac(secret, session_token) {
        Some(mac) => mac.verify_slice(&bytes).is_ok(),
        None => false,
    }
}

/// Reject requests without a valid `X-CSRF-Token` header. Runs after
/// `require_auth`, which records the session token.
pub async fn require_csrf(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let session = request
        .extensions()
        .get::<SessionToken>()
        .ok_or_else(|| ApiError::forbidden("CSRF verification failed"))?;

    let submitted = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if submitted.is_empty() || !verify_csrf_token(&state.config.security.secret, &session.0, submitted) {
        tracing::warn!("Rejected {} {}: bad CSRF token", request.method(), request.uri().path());
        return Err(ApiError::forbidden("CSRF verification failed"));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let token = csrf_token("secret", "session-1");
        assert_eq!(token.len(), 64);
        assert!(verify_csrf_token("secret", "session-1", &token));
        assert!(verify_csrf_token("secret", "session-1", &token.to_uppercase()));
    }

    #[test]
    fn test_token_bound_to_session_and_secret() {
        let token = csrf_token("secret", "session-1");
        assert!(!verify_csrf_token("secret", "session-2", &token));
        assert!(!verify_csrf_token("other", "session-1", &token));
        assert!(!verify_csrf_token("secret", "session-1", "zz"));
        assert!(!verify_csrf_token("secret", "session-1", ""));
    }
}
