//! Resolver endpoint: one POST per gateway call.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use event_channel::EventPublisher;
use record_store::RecordStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::gateway::MutationGateway;

/// A resolver invocation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub field_name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub data: Value,
}

/// POST /resolve: dispatches `fieldName` with its `arguments`.
pub async fn resolve<S, P>(
    State(gateway): State<Arc<MutationGateway<S, P>>>,
    body: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<Json<ResolveResponse>, ApiError>
where
    S: RecordStore + Clone + 'static,
    P: EventPublisher + 'static,
{
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let data = gateway
        .resolve(&request.field_name, &request.arguments)
        .await?;
    Ok(Json(ResolveResponse { data }))
}
