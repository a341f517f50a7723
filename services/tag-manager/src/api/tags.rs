//! Effective tag lookup for a VM.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use securetag_reconcile::ResourceName;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::crm::EffectiveTag;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/instances/effective-tags", get(effective_tags))
}

#[derive(Debug, Deserialize)]
struct EffectiveTagsQuery {
    project: String,
    zone: String,
    instance: String,
}

#[derive(Debug, Serialize)]
struct EffectiveTagsResponse {
    resource_name: ResourceName,
    effective_tags: Vec<EffectiveTag>,
}

async fn effective_tags(
    State(state): State<AppState>,
    Query(query): Query<EffectiveTagsQuery>,
) -> Result<Json<EffectiveTagsResponse>, ApiError> {
    let resource_name = ResourceName::for_instance(&query.project, &query.zone, &query.instance);
    let client = state.zones().get_client(&query.zone).await?;
    let effective_tags = client.list_effective_tags(&resource_name).await?;

    Ok(Json(EffectiveTagsResponse {
        resource_name,
        effective_tags,
    }))
}
