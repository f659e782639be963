use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::errors::EngineError;
use crate::server::actor::RequestActor;
use crate::server::app::AppState;
use crate::server::error::ApiResult;
use crate::services::import_service::{CsvImportBatch, ImportSummary};

#[derive(Debug, Default, Deserialize)]
pub struct ImportQuery {
    pub source: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// CSV body; admin only. `?timeout_secs=` overrides the configured budget.
pub async fn import_components(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Query(query): Query<ImportQuery>,
    body: Bytes,
) -> ApiResult<ImportSummary> {
    actor.require_admin("import components")?;
    let batch = CsvImportBatch::parse(query.source, body.to_vec()).await?;

    let imports = state.ctx.imports();
    let timeout_secs = query.timeout_secs;
    let summary = tokio::spawn(async move {
        imports
            .import_components(batch, &actor, timeout_secs)
            .await
    })
    .await
    .map_err(EngineError::from)??;
    Ok(Json(summary))
}
