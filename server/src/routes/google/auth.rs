use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::info;

use super::utils::{client_id_from, error_page, notice_page};
use crate::{
    components::layout::Notice,
    oauth::{AuthError, AuthState, ClientId},
    state::AppState,
};

#[derive(Deserialize)]
pub struct AuthorizeParams {
    pub client_id: Option<String>,
}

/// Start the Google OAuth flow for a client and send the browser to the
/// consent screen.
pub async fn authorize(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    let Some(raw) = client_id_from(&headers, params.client_id.as_deref()) else {
        return error_page(
            StatusCode::BAD_REQUEST,
            "Missing client id",
            "No client_id provided for authentication.",
        );
    };

    let client_id = match ClientId::parse(&raw) {
        Ok(client_id) => client_id,
        Err(err) => return error_page(StatusCode::BAD_REQUEST, "Invalid client id", err.to_string()),
    };

    if state.authorizer.status(&client_id) == AuthState::Authenticated {
        return already_authenticated(&state, &client_id);
    }

    match state.authorizer.begin(&client_id) {
        Ok(request) => {
            info!(client_id = %client_id, "Redirecting to Google consent screen");
            Redirect::to(&request.authorization_url).into_response()
        }
        Err(AuthError::AlreadyAuthenticated) => already_authenticated(&state, &client_id),
        Err(err) => error_page(err.status_code(), "Could not start authorization", err.to_string()),
    }
}

fn already_authenticated(state: &AppState, client_id: &ClientId) -> Response {
    let email = state
        .authorizer
        .session(client_id)
        .and_then(|session| session.credential().and_then(|tokens| tokens.email.clone()));

    let message = match email {
        Some(email) => format!("Already authenticated as {email}. You can close this window."),
        None => "Already authenticated. You can close this window.".to_string(),
    };

    notice_page(
        StatusCode::OK,
        "Already authorized",
        Notice::success("Already authorized", message),
    )
}
