use std::sync::Arc;

use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use crate::dto::ErrorResponse;
use crate::state::AppState;

/// Compares key bytes in constant time; `ct_eq` needs equal lengths, and the
/// length itself is not secret.
fn keys_match(presented: &[u8], expected: &[u8]) -> bool {
    presented.len() == expected.len() && presented.ct_eq(expected).into()
}

/// Gate for the `/v1` routes: every request must carry the pipeline API key
/// as `Authorization: Bearer <key>`. The rejection does not say whether the
/// header was missing or the key wrong.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());

    let authenticated = match auth_header {
        Some(header) => header
            .strip_prefix("Bearer ")
            .is_some_and(|token| keys_match(token.as_bytes(), state.api_key.as_bytes())),
        None => false,
    };

    if !authenticated {
        let body = ErrorResponse {
            error: "unauthorized".to_string(),
            message: "Provide the API key as 'Authorization: Bearer <key>'".to_string(),
        };
        return (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response();
    }

    next.run(request).await
}
