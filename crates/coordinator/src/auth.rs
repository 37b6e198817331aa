use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use subtle::ConstantTimeEq;

use crate::AppState;

/// `subtle::ConstantTimeEq` panics on a length mismatch between its
/// operands, so the length check happens first; that check is itself not
/// constant-time, but leaking a credential's *length* is the trade-off the
/// source's own plaintext comparison made too, and spec.md §9 only asks for
/// constant-time comparison of the value.
fn ct_eq_str(configured: &str, presented: &str) -> bool {
    let configured = configured.as_bytes();
    let presented = presented.as_bytes();
    if configured.len() != presented.len() {
        return false;
    }
    configured.ct_eq(presented).into()
}

/// Constant-time compare `token` against the configured worker token
/// (spec.md §9).
pub fn worker_token_matches(configured: &str, presented: &str) -> bool {
    ct_eq_str(configured, presented)
}

/// Rejection returned by [`BasicAuth`] when credentials are absent or wrong;
/// matches the source Flask `requires_auth` decorator's 401 + challenge.
pub struct Unauthorized;

impl IntoResponse for Unauthorized {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [(WWW_AUTHENTICATE, r#"Basic realm="Login Required""#)],
            "Could not verify your access level for that URL.\n\
             You have to login with proper credentials",
        )
            .into_response()
    }
}

/// Extractor that enforces HTTP Basic auth against the configured operator
/// credentials on console/static routes.
pub struct BasicAuth;

impl FromRequestParts<AppState> for BasicAuth {
    type Rejection = Unauthorized;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(Unauthorized)?;

        let encoded = header.strip_prefix("Basic ").ok_or(Unauthorized)?;
        let decoded = B64.decode(encoded).map_err(|_| Unauthorized)?;
        let decoded = String::from_utf8(decoded).map_err(|_| Unauthorized)?;
        let (user, pass) = decoded.split_once(':').ok_or(Unauthorized)?;

        let user_ok = ct_eq_str(&state.console_user, user);
        let pass_ok = ct_eq_str(&state.console_pass, pass);
        if user_ok && pass_ok {
            Ok(BasicAuth)
        } else {
            Err(Unauthorized)
        }
    }
}
