//! Bill analysis endpoints.
//!
//! `POST /api/analyze` runs the full repair-retry pipeline and returns the
//! canonical record with its pin overlay and dispute draft.
//! `POST /api/metrics` runs the single-shot metrics extraction.
//!
//! Model calls are blocking, so each request runs on a blocking worker.

use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{AnalyzeResponse, ApiContext, DocumentRequest};
use crate::pipeline::analysis::{AnalysisSession, BillAnalyzer, BillMetrics, DocumentPayload};

fn decode_document(payload: &DocumentRequest) -> Result<DocumentPayload, ApiError> {
    if payload.file.trim().is_empty() {
        return Err(ApiError::BadRequest("No file in request".into()));
    }
    Ok(DocumentPayload::from_data_url(&payload.file, &payload.mime_type)?)
}

pub async fn analyze(
    State(ctx): State<ApiContext>,
    Json(payload): Json<DocumentRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let document = decode_document(&payload)?;
    drop(payload);

    let factory = ctx.llm_factory();
    let mut session = AnalysisSession::new();
    tracing::info!(
        session_id = %session.id(),
        mime = %document.mime_type(),
        size = document.byte_len(),
        "Analysis requested"
    );

    let report = session
        .run(move |sink, cancel| {
            let llm = factory()?;
            BillAnalyzer::new(llm)
                .with_sink(sink)
                .with_cancel_flag(cancel)
                .analyze(&document)
        })
        .await?;

    Ok(Json(AnalyzeResponse::from(report)))
}

pub async fn metrics(
    State(ctx): State<ApiContext>,
    Json(payload): Json<DocumentRequest>,
) -> Result<Json<BillMetrics>, ApiError> {
    let document = decode_document(&payload)?;
    drop(payload);

    let factory = ctx.llm_factory();
    let metrics = tokio::task::spawn_blocking(move || {
        let llm = factory()?;
        BillAnalyzer::new(llm).extract_metrics(&document)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Metrics task failed: {e}")))??;

    Ok(Json(metrics))
}
