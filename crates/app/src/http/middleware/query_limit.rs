use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::http::ErrorBody;

const MAX_QUERY_STRING_LEN: usize = 512;

pub async fn enforce_query_length(req: Request, next: Next) -> Response {
    if is_query_too_long(req.uri().query()) {
        let body = ErrorBody {
            error: format!("query string too long (max {MAX_QUERY_STRING_LEN} chars)"),
        };
        return (StatusCode::URI_TOO_LONG, axum::Json(body)).into_response();
    }
    next.run(req).await
}

fn is_query_too_long(query: Option<&str>) -> bool {
    query.is_some_and(|value| value.len() > MAX_QUERY_STRING_LEN)
}

#[cfg(test)]
mod tests {
    use super::{is_query_too_long, MAX_QUERY_STRING_LEN};

    #[test]
    fn query_length_within_limit() {
        let query = "a".repeat(MAX_QUERY_STRING_LEN);
        assert!(!is_query_too_long(Some(&query)));
        assert!(!is_query_too_long(None));
    }

    #[test]
    fn query_length_exceeds_limit() {
        let query = "a".repeat(MAX_QUERY_STRING_LEN + 1);
        assert!(is_query_too_long(Some(&query)));
    }
}
