use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use tracing::{error, info, warn};

use super::utils::{error_page, notice_page};
use crate::{components::layout::Notice, oauth::AuthError, state::AppState};

#[derive(Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Google redirects here after the consent screen.
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(provider_error) = params.error {
        let description = params
            .error_description
            .unwrap_or_else(|| "No error description provided".to_string());
        warn!(error = %provider_error, %description, "Google returned an authorization error");

        if let Some(nonce) = params.state.as_deref() {
            // An unknown state here is logged by the authorizer; nothing to undo
            let _ = state.authorizer.cancel(nonce, &provider_error);
        }

        let err = AuthError::AuthorizationDenied(provider_error);
        return error_page(err.status_code(), "Authorization was not granted", format!("{err}: {description}"));
    }

    let (Some(code), Some(nonce)) = (params.code, params.state) else {
        return error_page(
            StatusCode::BAD_REQUEST,
            "Incomplete callback",
            "The authorization response is missing its code or state.",
        );
    };

    match state.authorizer.complete(&nonce, &code).await {
        Ok(done) => {
            info!(client_id = %done.client_id, "Authorization callback completed");
            let message = match done.email {
                Some(email) => format!(
                    "Authentication successful for user: {email}. You can close this window and return to the chat."
                ),
                None => "Authentication successful. You can close this window and return to the chat."
                    .to_string(),
            };
            notice_page(
                StatusCode::OK,
                "Authorization complete",
                Notice::success("Authorization complete", message),
            )
        }
        Err(err @ AuthError::InvalidOAuthState) => error_page(
            err.status_code(),
            "Invalid or expired authorization",
            "This authorization link is unknown, expired or was already used. Ask your assistant for a new one.",
        ),
        Err(err) => {
            error!(error = %err, "Authorization callback failed");
            error_page(err.status_code(), "Authorization failed", err.to_string())
        }
    }
}
