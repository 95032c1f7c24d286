//! Admin-only endpoints.

use axum::{
    extract::{Extension, Query},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use utoipa::IntoParams;

use super::auth::{require_role, AuthState};
use crate::{
    api::types::{ErrorResponse, IdentityListResponse},
    auth::{AuthError, Identity, Role},
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Only list identities with this role.
    pub role: Option<Role>,
}

#[utoipa::path(
    get,
    path = "/v1/admin/identities",
    params(ListQuery),
    responses(
        (status = 200, description = "Registered identities", body = IdentityListResponse),
        (status = 401, description = "Missing, expired or invalid access token", body = ErrorResponse),
        (status = 403, description = "Session is not an admin session", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn list_identities(
    state: Extension<Arc<AuthState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<IdentityListResponse>, AuthError> {
    let principal = require_role(&headers, &state, Role::Admin).await?;
    let identities = state.credentials().list(query.role).await?;
    debug!(
        admin_id = %principal.identity_id,
        count = identities.len(),
        "listed identities"
    );
    Ok(Json(IdentityListResponse {
        identities: identities.iter().map(Identity::summary).collect(),
    }))
}
