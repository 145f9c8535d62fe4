use std::fmt::Debug;

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

use crate::oauth::AuthError;

#[derive(Debug)]
pub struct ServerError<R: IntoResponse>(pub(crate) color_eyre::Report, pub(crate) R);

pub type ServerResult<S, F = Response> = Result<S, ServerError<F>>;

impl<R: IntoResponse> IntoResponse for ServerError<R> {
    fn into_response(self) -> axum::response::Response {
        tracing::error!(error = ?self.0, "Request Error");

        // Check if we're in development mode and this is a 500 error
        let is_dev_mode = std::env::var("DEVELOPMENT_MODE")
            .map(|v| v == "1")
            .unwrap_or(false);

        let response = self.1.into_response();
        if is_dev_mode && response.status() == StatusCode::INTERNAL_SERVER_ERROR {
            let error_text = maud::html! { (format!("{:?}", self.0)) }.into_string();

            let error_html = format!(
                r#"<!DOCTYPE html>
<html>
<head>
    <title>Development Error - 500</title>
    <style>
        body {{ font-family: monospace; margin: 20px; background: #1a1a1a; color: #fff; }}
        pre {{ background: #000; padding: 15px; border-radius: 4px; white-space: pre-wrap; }}
    </style>
</head>
<body>
    <h1>Development Mode - Internal Server Error</h1>
    <pre>{}</pre>
</body>
</html>"#,
                error_text
            );

            return (StatusCode::INTERNAL_SERVER_ERROR, Html(error_html)).into_response();
        }

        response
    }
}

impl<E> From<E> for ServerError<StatusCode>
where
    E: Into<color_eyre::Report>,
{
    fn from(err: E) -> Self {
        ServerError(err.into(), StatusCode::INTERNAL_SERVER_ERROR)
    }
}

pub(crate) trait WithStatus<T> {
    fn with_status(self, status: StatusCode) -> Result<T, ServerError<StatusCode>>;
}

impl<T, E> WithStatus<T> for Result<T, E>
where
    E: Into<color_eyre::Report>,
{
    fn with_status(self, status: StatusCode) -> Result<T, ServerError<StatusCode>> {
        self.map_err(|err| ServerError(err.into(), status))
    }
}

impl AuthError {
    /// HTTP status for a failed browser-facing auth step.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidClientId(_)
            | AuthError::InvalidOAuthState
            | AuthError::AuthorizationDenied(_) => StatusCode::BAD_REQUEST,
            AuthError::AlreadyAuthenticated => StatusCode::CONFLICT,
            AuthError::ExchangeFailure(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::ExchangeError;

    #[test]
    fn test_auth_error_status_codes() {
        assert_eq!(
            AuthError::InvalidOAuthState.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::ExchangeFailure(ExchangeError::InvalidGrant("x".to_string())).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_with_status_keeps_status() {
        let result: Result<(), AuthError> = Err(AuthError::InvalidOAuthState);
        let err = result.with_status(StatusCode::BAD_REQUEST).unwrap_err();

        assert_eq!(err.1, StatusCode::BAD_REQUEST);
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
