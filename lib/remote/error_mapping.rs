use reqwest::StatusCode;

use crate::sync_service::SubmitError;

const BODY_SNIPPET_MAX: usize = 240;

/// Classifies a transport-level failure (no HTTP status available).
///
/// Everything at this layer is retryable: the request may never have reached
/// the backend, and the idempotency key makes a duplicate delivery safe.
pub(crate) fn map_transport_error(err: &reqwest::Error, endpoint: &str) -> SubmitError {
    if err.is_timeout() {
        return SubmitError::network(format!("timeout while submitting to {endpoint}: {err}"));
    }
    if err.is_connect() {
        return SubmitError::network(format!(
            "connection error while submitting to {endpoint}: {err}"
        ));
    }
    if err.is_decode() || err.is_body() {
        return SubmitError::network(format!(
            "response decode error from {endpoint} (retryable): {err}"
        ));
    }

    SubmitError::network(format!(
        "transport error while submitting to {endpoint}: {err}"
    ))
}

/// Classifies an HTTP status into retryable vs. terminal.
///
/// 401/403 deliberately stay retryable: an expired device session must not
/// dead-letter buffered movements, re-authentication is the app shell's
/// concern.
pub(crate) fn map_status(status: StatusCode, endpoint: &str, body: Option<&str>) -> SubmitError {
    let detail = body
        .map(truncate_snippet)
        .filter(|snippet| !snippet.is_empty())
        .map(|snippet| format!(": {snippet}"))
        .unwrap_or_default();

    match status.as_u16() {
        401 | 403 => SubmitError::network(format!(
            "authentication failure ({status}) while submitting to {endpoint}{detail}"
        )),
        408 | 429 => SubmitError::network(format!(
            "backend asked to retry ({status}) on {endpoint}{detail}"
        )),
        400..=499 => SubmitError::validation(format!(
            "backend rejected submission to {endpoint} ({status}){detail}"
        )),
        500..=599 => SubmitError::network(format!(
            "backend unavailable ({status}) for {endpoint}{detail}"
        )),
        _ => SubmitError::network(format!(
            "unexpected HTTP status {status} from {endpoint}{detail}"
        )),
    }
}

fn truncate_snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= BODY_SNIPPET_MAX {
        return trimmed.to_string();
    }
    let mut end = BODY_SNIPPET_MAX;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_rate_limits_are_retryable() {
        for code in [500u16, 502, 503, 429, 408] {
            let status = StatusCode::from_u16(code).unwrap();
            let mapped = map_status(status, "/api/v1/lager/bewegung", None);
            assert!(mapped.is_retryable(), "expected {code} to be retryable");
        }
    }

    #[test]
    fn business_rejections_are_terminal() {
        for code in [400u16, 404, 409, 422] {
            let status = StatusCode::from_u16(code).unwrap();
            let mapped = map_status(status, "/api/v1/mobile/scan", Some("unbekannter Artikel"));
            assert!(!mapped.is_retryable(), "expected {code} to be terminal");
            assert!(mapped.message.contains("unbekannter Artikel"));
        }
    }

    #[test]
    fn auth_failures_stay_in_the_retry_cycle() {
        let mapped = map_status(StatusCode::UNAUTHORIZED, "/api/v1/charge/auswahl", None);
        assert!(mapped.is_retryable());
    }

    #[test]
    fn long_bodies_are_truncated_in_messages() {
        let body = "x".repeat(1_000);
        let mapped = map_status(
            StatusCode::UNPROCESSABLE_ENTITY,
            "/api/v1/mobile/scan",
            Some(&body),
        );
        assert!(mapped.message.len() < 400);
        assert!(mapped.message.ends_with("..."));
    }
}
