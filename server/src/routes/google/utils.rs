use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::components::layout::{Card, Notice, Page};

/// Header MCP clients use to identify themselves.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// The caller's client id, from the `X-Client-ID` header or a `client_id`
/// query parameter. The header wins when both are present.
pub fn client_id_from(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .or(query)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Full HTML page for the end of a browser step.
pub fn notice_page(status: StatusCode, title: &str, notice: Notice) -> Response {
    (status, Page::new(title, Card::new(notice).with_max_width("max-w-lg"))).into_response()
}

pub fn error_page(status: StatusCode, heading: &str, message: impl Into<String>) -> Response {
    notice_page(status, "Authorization failed", Notice::error(heading, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_ID_HEADER, HeaderValue::from_static("from-header"));

        assert_eq!(
            client_id_from(&headers, Some("from-query")).as_deref(),
            Some("from-header")
        );
        assert_eq!(
            client_id_from(&HeaderMap::new(), Some(" from-query ")).as_deref(),
            Some("from-query")
        );
        assert_eq!(client_id_from(&HeaderMap::new(), Some("  ")), None);
        assert_eq!(client_id_from(&HeaderMap::new(), None), None);
    }
}
