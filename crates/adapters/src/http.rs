//! Shared HTTP plumbing for the networked adapters.
//!
//! Every request races the caller's cancellation token, carries the client
//! timeout, and maps transport and status failures onto [`ErrorEnvelope`]
//! with a retry classification the app layer can act on.

use code_index_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use std::time::Duration;

const ERROR_BODY_PREVIEW_CHARS: usize = 256;

/// Describes which adapter a request belongs to, for error mapping.
#[derive(Debug, Clone, Copy)]
pub struct HttpSurface {
    /// Error code namespace (`embedding`, `vector`).
    pub namespace: &'static str,
    /// Human-readable provider name used in messages.
    pub provider: &'static str,
    /// Classification of HTTP 429.
    pub rate_limit_class: ErrorClass,
}

/// Raw response: status plus fully read body.
#[derive(Debug)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl HttpReply {
    /// Decode a successful body, or map the status to an error.
    pub fn decode<T: DeserializeOwned>(self, surface: HttpSurface) -> Result<T> {
        if !self.status.is_success() {
            return Err(map_http_status(surface, self.status, &self.body));
        }
        decode_body(surface, &self.body)
    }

    /// Succeed on any 2xx status, ignoring the body.
    pub fn ensure_success(self, surface: HttpSurface) -> Result<()> {
        if self.status.is_success() {
            Ok(())
        } else {
            Err(map_http_status(surface, self.status, &self.body))
        }
    }
}

pub fn build_client(
    surface: HttpSurface,
    timeout_ms: u64,
    headers: HeaderMap,
) -> Result<reqwest::Client> {
    if timeout_ms == 0 {
        return Err(ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            "timeout must be greater than zero",
        ));
    }
    reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .default_headers(headers)
        .build()
        .map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new(surface.namespace, "client_init_failed"),
                format!("failed to build {} client: {error}", surface.provider),
                ErrorClass::NonRetriable,
            )
            .with_metadata("provider", surface.provider)
        })
}

/// Send a request and read the whole body, aborting on cancellation.
pub async fn send(
    ctx: &RequestContext,
    surface: HttpSurface,
    request: reqwest::RequestBuilder,
    operation: &'static str,
) -> Result<HttpReply> {
    ctx.ensure_not_cancelled(operation)?;

    let response = tokio::select! {
        () = ctx.cancelled() => return Err(cancelled_error(operation)),
        result = request.send() => result.map_err(|error| map_reqwest_error(surface, &error))?,
    };

    let status = response.status();
    let body = tokio::select! {
        () = ctx.cancelled() => return Err(cancelled_error(operation)),
        result = response.bytes() => result.map_err(|error| map_reqwest_error(surface, &error))?,
    };

    Ok(HttpReply {
        status,
        body: body.to_vec(),
    })
}

/// Send a request and decode a JSON body.
pub async fn send_json<T: DeserializeOwned>(
    ctx: &RequestContext,
    surface: HttpSurface,
    request: reqwest::RequestBuilder,
    operation: &'static str,
) -> Result<T> {
    send(ctx, surface, request, operation).await?.decode(surface)
}

pub fn cancelled_error(operation: &'static str) -> ErrorEnvelope {
    ErrorEnvelope::cancelled("operation cancelled").with_metadata("operation", operation)
}

fn decode_body<T: DeserializeOwned>(surface: HttpSurface, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::new(surface.namespace, "invalid_response"),
            format!("failed to decode {} response: {error}", surface.provider),
            ErrorClass::NonRetriable,
        )
        .with_metadata("provider", surface.provider)
    })
}

pub fn map_reqwest_error(surface: HttpSurface, error: &reqwest::Error) -> ErrorEnvelope {
    let envelope = if error.is_timeout() {
        ErrorEnvelope::unexpected(
            ErrorCode::timeout(),
            format!("{} request timed out", surface.provider),
            ErrorClass::Retriable,
        )
    } else if error.is_connect() {
        ErrorEnvelope::unexpected(
            ErrorCode::io(),
            format!("{} connection failed: {error}", surface.provider),
            ErrorClass::Retriable,
        )
    } else if error.is_body() || error.is_request() {
        ErrorEnvelope::unexpected(
            ErrorCode::io(),
            format!("{} request interrupted: {error}", surface.provider),
            ErrorClass::Retriable,
        )
    } else {
        ErrorEnvelope::unexpected(
            ErrorCode::new(surface.namespace, "request_failed"),
            format!("{} request failed: {error}", surface.provider),
            ErrorClass::NonRetriable,
        )
    };
    envelope.with_metadata("provider", surface.provider)
}

/// Map a non-success status onto the error taxonomy.
///
/// 408 and 5xx are transient. 429 follows the surface's rate-limit class.
/// Authentication failures and the remaining 4xx are fatal.
pub fn map_http_status(surface: HttpSurface, status: StatusCode, body: &[u8]) -> ErrorEnvelope {
    let message = error_message(body).unwrap_or_else(|| {
        format!("{} request failed with status {}", surface.provider, status.as_u16())
    });
    let envelope = match status.as_u16() {
        400 | 404 | 422 => ErrorEnvelope::expected(
            ErrorCode::new(surface.namespace, "invalid_request"),
            message,
        ),
        401 | 403 => ErrorEnvelope::expected(ErrorCode::permission_denied(), message),
        408 => ErrorEnvelope::unexpected(ErrorCode::timeout(), message, ErrorClass::Retriable),
        429 => {
            ErrorEnvelope::unexpected(ErrorCode::rate_limited(), message, surface.rate_limit_class)
        },
        _ if status.is_server_error() => ErrorEnvelope::unexpected(
            ErrorCode::new("core", "dependency_unavailable"),
            message,
            ErrorClass::Retriable,
        ),
        _ => ErrorEnvelope::unexpected(
            ErrorCode::new(surface.namespace, "http_error"),
            message,
            ErrorClass::NonRetriable,
        ),
    };
    envelope
        .with_metadata("provider", surface.provider)
        .with_metadata("status", status.as_u16().to_string())
}

/// Best-effort extraction of a provider error message.
///
/// Understands `{"error": {"message": ..}}`, `{"error": ".."}` and
/// `{"status": {"error": ".."}}`; falls back to a short body preview.
fn error_message(body: &[u8]) -> Option<String> {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        let candidates = [
            value.pointer("/error/message"),
            value.get("error"),
            value.pointer("/status/error"),
            value.get("message"),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(text) = candidate.as_str()
                && !text.trim().is_empty()
            {
                return Some(text.trim().to_owned());
            }
        }
    }
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(ERROR_BODY_PREVIEW_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SURFACE: HttpSurface = HttpSurface {
        namespace: "embedding",
        provider: "Test",
        rate_limit_class: ErrorClass::NonRetriable,
    };

    #[test]
    fn status_mapping_separates_transient_from_fatal() {
        let server = map_http_status(SURFACE, StatusCode::BAD_GATEWAY, b"");
        assert!(server.is_retriable());
        assert_eq!(server.metadata_value("status"), Some("502"));

        let timeout = map_http_status(SURFACE, StatusCode::REQUEST_TIMEOUT, b"");
        assert_eq!(timeout.code, ErrorCode::timeout());
        assert!(timeout.is_retriable());

        let auth = map_http_status(SURFACE, StatusCode::UNAUTHORIZED, b"");
        assert_eq!(auth.code, ErrorCode::permission_denied());
        assert!(!auth.is_retriable());

        let invalid = map_http_status(SURFACE, StatusCode::UNPROCESSABLE_ENTITY, b"");
        assert_eq!(invalid.code, ErrorCode::new("embedding", "invalid_request"));

        let teapot = map_http_status(SURFACE, StatusCode::IM_A_TEAPOT, b"");
        assert_eq!(teapot.code, ErrorCode::new("embedding", "http_error"));
    }

    #[test]
    fn rate_limit_class_follows_surface() {
        let fatal = map_http_status(SURFACE, StatusCode::TOO_MANY_REQUESTS, b"");
        assert_eq!(fatal.code, ErrorCode::rate_limited());
        assert!(!fatal.is_retriable());

        let retried = map_http_status(
            HttpSurface {
                rate_limit_class: ErrorClass::Retriable,
                ..SURFACE
            },
            StatusCode::TOO_MANY_REQUESTS,
            b"",
        );
        assert!(retried.is_retriable());
    }

    #[test]
    fn error_messages_are_extracted_from_common_shapes() {
        assert_eq!(
            error_message(br#"{"error":{"message":"bad key"}}"#).as_deref(),
            Some("bad key")
        );
        let message = error_message(br#"{"error":"model missing"}"#);
        assert_eq!(message.as_deref(), Some("model missing"));
        assert_eq!(
            error_message(br#"{"status":{"error":"Not found: collection"}}"#).as_deref(),
            Some("Not found: collection")
        );
        assert_eq!(error_message(b"  upstream down ").as_deref(), Some("upstream down"));
        assert_eq!(error_message(b""), None);
    }
}
