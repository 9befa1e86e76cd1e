use axum::{body::Bytes, extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::{info, warn};

use crate::{errors::ServiceError, services::payments::WebhookDisposition, AppState};

type HmacSha256 = Hmac<Sha256>;

/// Inbound processor webhook.
///
/// Returns 2xx once the event has been applied (or recognized as already
/// applied / irrelevant); any processing error returns non-2xx so the
/// processor redelivers. Redelivery is safe because the underlying state
/// transition is guarded by a conditional update.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Event accepted"),
        (status = 400, description = "Malformed payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    if let Some(secret) = &state.config.payment_webhook_secret {
        let tolerance = state.config.payment_webhook_tolerance_secs.unwrap_or(300);
        if !verify_signature(&headers, &body, secret, tolerance) {
            warn!("payment webhook signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let json: Value = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::ValidationError(format!("invalid webhook json: {e}")))?;

    let event_type = json
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ServiceError::ValidationError("webhook event missing type".to_string()))?;

    let intent_id = json
        .pointer("/data/object/id")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    // Events we do not know about are accepted without requiring an intent
    // id, so the processor can add event types freely.
    if !matches!(
        event_type,
        "payment_intent.succeeded" | "payment_intent.payment_failed"
    ) {
        info!(event_type, "accepting unhandled webhook event type");
        return Ok((StatusCode::OK, "ok"));
    }

    if intent_id.is_empty() {
        return Err(ServiceError::ValidationError(
            "webhook event missing data.object.id".to_string(),
        ));
    }

    let disposition = state
        .services
        .payments
        .handle_webhook_event(event_type, intent_id)
        .await?;

    match disposition {
        WebhookDisposition::Applied => info!(event_type, intent_id, "webhook event applied"),
        WebhookDisposition::AlreadyApplied => {
            info!(event_type, intent_id, "webhook event already applied")
        }
        WebhookDisposition::Ignored => {}
    }

    Ok((StatusCode::OK, "ok"))
}

/// Verify the HMAC signature on the raw payload. Supports a generic
/// `x-timestamp`/`x-signature` pair and the Stripe `t=`/`v1=` header form;
/// both sign `"{timestamp}.{payload}"`.
fn verify_signature(headers: &HeaderMap, payload: &Bytes, secret: &str, tolerance_secs: u64) -> bool {
    if let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) {
        if let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) {
            if let Ok(ts_i) = ts.parse::<i64>() {
                let now = chrono::Utc::now().timestamp();
                if (now - ts_i).unsigned_abs() > tolerance_secs {
                    return false;
                }
            }
            return signature_matches(ts, payload, secret, sig);
        }
    }

    if let Some(sig) = headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    {
        let mut ts = "";
        let mut v1 = "";
        for part in sig.split(',') {
            let mut it = part.split('=');
            match (it.next(), it.next()) {
                (Some("t"), Some(val)) => ts = val,
                (Some("v1"), Some(val)) => v1 = val,
                _ => {}
            }
        }
        if !ts.is_empty() && !v1.is_empty() {
            return signature_matches(ts, payload, secret, v1);
        }
    }

    false
}

fn signature_matches(timestamp: &str, payload: &Bytes, secret: &str, provided: &str) -> bool {
    let signed = format!("{}.{}", timestamp, std::str::from_utf8(payload).unwrap_or(""));
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(signed.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, provided)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
