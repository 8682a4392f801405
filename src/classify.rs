use reqwest::{header::HeaderMap, StatusCode};

use crate::{retry_after::parse_retry_after, ApiError, RateLimitError, ShoplineError};

/// Upper bound on how much of an error body is read for classification.
pub(crate) const ERROR_BODY_LIMIT: usize = 512;

const SNIPPET_CHARS: usize = 200;

/// Turns a non-success response into exactly one typed error.
///
/// A `{code,message}` body is used verbatim when the content type is JSON
/// (`application/json` or a `+json` suffix) or absent.
pub(crate) fn classify_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: &[u8],
) -> ShoplineError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let header = headers
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        return RateLimitError {
            retry_after: parse_retry_after(header),
        }
        .into();
    }

    let content_type = headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let phrase = status.canonical_reason().unwrap_or("Unknown Status");

    if content_type.is_empty() || is_json(content_type) {
        if let Some(mut err) = decode_api_error(body) {
            err.status = status.as_u16();
            if err.code.trim().is_empty() {
                err.code = format!("HTTP_{}", status.as_u16());
            }
            if err.message.trim().is_empty() {
                err.message = phrase.to_owned();
            }
            return err.into();
        }
    }

    let message = if body.is_empty() || looks_like_html(content_type, body) {
        phrase.to_owned()
    } else {
        format!("{phrase}: {}", snippet(body))
    };

    ApiError {
        status: status.as_u16(),
        code: format!("HTTP_{}", status.as_u16()),
        message,
    }
    .into()
}

fn decode_api_error(body: &[u8]) -> Option<ApiError> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let object = value.as_object()?;
    if !object.contains_key("code") && !object.contains_key("message") {
        return None;
    }
    serde_json::from_value(value).ok()
}

fn mime(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_json(content_type: &str) -> bool {
    let mime = mime(content_type);
    mime == "application/json" || mime.ends_with("+json")
}

fn looks_like_html(content_type: &str, body: &[u8]) -> bool {
    let mime = mime(content_type);
    if mime == "text/html" || mime == "application/xhtml+xml" {
        return true;
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim_start();
    if text.starts_with('<') && text.contains('>') {
        return true;
    }
    let lowered = text.to_ascii_lowercase();
    lowered.contains("<html") || lowered.contains("<!doctype")
}

fn snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.chars().count() > SNIPPET_CHARS {
        let cut: String = text.chars().take(SNIPPET_CHARS).collect();
        format!("{cut}...")
    } else {
        text.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::{
        header::{HeaderMap, HeaderValue, CONTENT_TYPE, RETRY_AFTER},
        StatusCode,
    };

    use super::classify_response;
    use crate::ShoplineError;

    fn headers(pairs: &[(reqwest::header::HeaderName, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_static(*value));
        }
        map
    }

    fn api(err: ShoplineError) -> crate::ApiError {
        match err {
            ShoplineError::Api(err) => err,
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn rate_limit_uses_retry_after_header() {
        let err = classify_response(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[(RETRY_AFTER, "30")]),
            b"",
        );
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn rate_limit_without_header_waits_one_second() {
        let err = classify_response(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new(), b"");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn json_body_code_and_message_are_used_verbatim() {
        let err = api(classify_response(
            StatusCode::NOT_FOUND,
            &headers(&[(CONTENT_TYPE, "application/json")]),
            br#"{"code":"NOT_FOUND","message":"Resource not found"}"#,
        ));
        assert_eq!(err.status, 404);
        assert_eq!(err.code, "NOT_FOUND");
        assert_eq!(err.message, "Resource not found");
    }

    #[test]
    fn html_body_is_replaced_by_status_phrase() {
        let err = api(classify_response(
            StatusCode::NOT_FOUND,
            &headers(&[(CONTENT_TYPE, "text/html; charset=utf-8")]),
            b"<html><body>Not Found</body></html>",
        ));
        assert_eq!(err.code, "HTTP_404");
        assert_eq!(err.message, "Not Found");
    }

    #[test]
    fn markup_without_html_content_type_is_still_dropped() {
        let err = api(classify_response(
            StatusCode::BAD_GATEWAY,
            &HeaderMap::new(),
            b"<!DOCTYPE html><HTML><body>nginx</body></HTML>",
        ));
        assert_eq!(err.message, "Bad Gateway");
    }

    #[test]
    fn markup_fragment_served_as_text_is_dropped() {
        let err = api(classify_response(
            StatusCode::BAD_GATEWAY,
            &headers(&[(CONTENT_TYPE, "text/plain")]),
            b"<h1>502 Bad Gateway</h1><hr><center>nginx</center>",
        ));
        assert_eq!(err.code, "HTTP_502");
        assert_eq!(err.message, "Bad Gateway");
    }

    #[test]
    fn json_message_without_code_gets_status_code() {
        let err = api(classify_response(
            StatusCode::NOT_FOUND,
            &HeaderMap::new(),
            br#"{"message":"Missing"}"#,
        ));
        assert_eq!(err.status, 404);
        assert_eq!(err.code, "HTTP_404");
        assert_eq!(err.message, "Missing");
    }

    #[test]
    fn json_code_without_message_gets_status_phrase() {
        let err = api(classify_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            &headers(&[(CONTENT_TYPE, "application/problem+json")]),
            br#"{"code":"INVALID"}"#,
        ));
        assert_eq!(err.code, "INVALID");
        assert_eq!(err.message, "Unprocessable Entity");
    }

    #[test]
    fn error_shaped_json_served_as_text_is_a_snippet() {
        let err = api(classify_response(
            StatusCode::BAD_REQUEST,
            &headers(&[(CONTENT_TYPE, "text/plain")]),
            br#"{"code":"X","message":"y"}"#,
        ));
        assert_eq!(err.code, "HTTP_400");
        assert_eq!(err.message, r#"Bad Request: {"code":"X","message":"y"}"#);
    }

    #[test]
    fn plain_text_body_is_appended_to_phrase() {
        let err = api(classify_response(
            StatusCode::BAD_GATEWAY,
            &HeaderMap::new(),
            b"upstream timeout",
        ));
        assert_eq!(err.code, "HTTP_502");
        assert_eq!(err.message, "Bad Gateway: upstream timeout");
    }

    #[test]
    fn malformed_json_falls_back_to_snippet() {
        let err = api(classify_response(
            StatusCode::BAD_REQUEST,
            &headers(&[(CONTENT_TYPE, "application/json")]),
            b"invalid json",
        ));
        assert_eq!(err.code, "HTTP_400");
        assert_eq!(err.message, "Bad Request: invalid json");
    }

    #[test]
    fn json_without_error_fields_falls_back_to_snippet() {
        let err = api(classify_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &HeaderMap::new(),
            br#"{"error":"boom"}"#,
        ));
        assert_eq!(err.code, "HTTP_500");
        assert_eq!(err.message, r#"Internal Server Error: {"error":"boom"}"#);
    }

    #[test]
    fn long_snippet_is_truncated() {
        let body = "x".repeat(400);
        let err = api(classify_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &HeaderMap::new(),
            body.as_bytes(),
        ));
        let expected = format!("Service Unavailable: {}...", "x".repeat(200));
        assert_eq!(err.message, expected);
    }

    #[test]
    fn empty_body_uses_phrase_only() {
        let err = api(classify_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &HeaderMap::new(),
            b"",
        ));
        assert_eq!(err.message, "Internal Server Error");
    }
}
