//! Webhook authentication.

use axum::{
    body::{self, Body},
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use receptionist_core::twilio::verify_request_signature;
use tracing::warn;

use crate::{handlers::ApiError, state::InboundRouteState};

pub const SIGNATURE_HEADER: &str = "X-Twilio-Signature";

/// Twilio webhook forms are a few kilobytes.
const MAX_WEBHOOK_BODY_BYTES: usize = 64 * 1024;

/// Rejects webhooks whose `X-Twilio-Signature` does not match the public
/// URL and form parameters under the route's auth token.
pub async fn verify_twilio_signature(
    State(route): State<InboundRouteState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !route.inbound.verify_signatures {
        return Ok(next.run(request).await);
    }

    // 1. Extract signature
    let signature = request
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Forbidden("Missing Twilio signature".to_string()))?;

    let url = route.public_url(
        request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/"),
    );

    // 2. Buffer the form so the handler can still read it
    let (parts, body) = request.into_parts();
    let bytes = body::to_bytes(body, MAX_WEBHOOK_BODY_BYTES)
        .await
        .map_err(|e| ApiError::BadRequest(format!("Unreadable webhook body: {}", e)))?;
    let params: Vec<(String, String)> = url::form_urlencoded::parse(&bytes).into_owned().collect();

    // 3. Verify
    if !verify_request_signature(
        &route.inbound.twilio_config.auth_token,
        &url,
        &params,
        &signature,
    ) {
        warn!(%url, "Rejected webhook with invalid Twilio signature");
        return Err(ApiError::Forbidden("Invalid Twilio signature".to_string()));
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}
