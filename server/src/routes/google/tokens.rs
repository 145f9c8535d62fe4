use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use super::utils::client_id_from;
use crate::{
    errors::{ServerResult, WithStatus},
    oauth::{AuthState, ClientId},
    state::AppState,
};

#[derive(Deserialize)]
pub struct ClientParams {
    pub client_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub client_id: String,
    pub state: AuthState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RevokeResponse {
    pub client_id: String,
    pub revoked: bool,
}

fn require_client_id(headers: &HeaderMap, query: Option<&str>) -> ServerResult<ClientId, StatusCode> {
    let raw = client_id_from(headers, query)
        .ok_or_else(|| color_eyre::eyre::eyre!("No client_id provided"))
        .with_status(StatusCode::BAD_REQUEST)?;

    ClientId::parse(&raw).with_status(StatusCode::BAD_REQUEST)
}

/// Where a client is in the authorization flow.
pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ClientParams>,
) -> ServerResult<Json<StatusResponse>, StatusCode> {
    let client_id = require_client_id(&headers, params.client_id.as_deref())?;

    Ok(Json(StatusResponse {
        state: state.authorizer.status(&client_id),
        client_id: client_id.to_string(),
    }))
}

/// Forget the client's credential and revoke it at Google.
pub async fn revoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ClientParams>,
) -> ServerResult<Json<RevokeResponse>, StatusCode> {
    let client_id = require_client_id(&headers, params.client_id.as_deref())?;
    let revoked = state.authorizer.revoke(&client_id).await?;

    Ok(Json(RevokeResponse {
        client_id: client_id.to_string(),
        revoked,
    }))
}
