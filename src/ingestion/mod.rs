//! Knowledge ingestion pipeline.
//!
//! Extract text from an uploaded payload, split it into overlapping
//! windows, embed and persist each window as a knowledge chunk, and walk
//! the file's processing status pending→processing→completed/failed.
//!
//! Per-chunk failures are tolerated: a chunk whose embedding call fails is
//! persisted without a vector (it will never rank in retrieval) and counted
//! in the report; one bad chunk never aborts the rest. Provider calls run
//! with the store lock released.

pub mod chunk;
pub mod extract;

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::ChunkingConfig;
use crate::db::{DbError, NewChunk, Store};
use crate::generation::provider::{ProviderError, TextProvider};
use crate::retrieval::f32_vec_to_blob;
use crate::types::ProcessingStatus;
use extract::{ExtractError, SourceFormat};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("transcription failed: {0}")]
    Transcribe(ProviderError),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Partial-failure report for one ingestion run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub chunks_total: usize,
    pub chunks_embedded: usize,
    pub chunks_failed: usize,
    /// The declared type had no extractor; ingestion was a logged no-op.
    pub skipped_unsupported: bool,
}

/// Run the ingestion pipeline for an uploaded file.
///
/// On success the file lands in `completed` (even for unsupported types and
/// empty extractions, where there is just nothing to index); extraction or
/// transcription failure lands it in `failed` and propagates the error.
pub async fn ingest_file(
    store: &Mutex<Store>,
    provider: &dyn TextProvider,
    chunking: &ChunkingConfig,
    file_id: &str,
    bytes: &[u8],
    mime_type: &str,
    filename: &str,
) -> Result<IngestReport, IngestError> {
    store
        .lock()
        .set_processing_status(file_id, ProcessingStatus::Processing)?;

    let format = extract::detect_format(mime_type);

    if format == SourceFormat::Unsupported {
        log::warn!("unsupported file type for ingestion: {mime_type} ({filename})");
        store
            .lock()
            .set_processing_status(file_id, ProcessingStatus::Completed)?;
        return Ok(IngestReport {
            skipped_unsupported: true,
            ..Default::default()
        });
    }

    let text = match extract_text(provider, bytes, mime_type, format).await {
        Ok(text) => text,
        Err(e) => {
            log::error!("ingestion extraction failed for {filename}: {e}");
            store
                .lock()
                .set_processing_status(file_id, ProcessingStatus::Failed)?;
            return Err(e);
        }
    };

    if text.trim().is_empty() {
        log::warn!("no text extracted from {filename}");
        store
            .lock()
            .set_processing_status(file_id, ProcessingStatus::Completed)?;
        return Ok(IngestReport::default());
    }

    let windows = chunk::chunk_text(&text, chunking.window_chars, chunking.overlap_chars);
    let mut report = IngestReport {
        chunks_total: windows.len(),
        ..Default::default()
    };

    for (index, window) in windows.iter().enumerate() {
        let embedding = match provider.embed(&window.text).await {
            Ok(vector) => Some(f32_vec_to_blob(&vector)),
            Err(e) => {
                log::warn!("embedding failed for {filename} chunk {index}: {e}");
                None
            }
        };

        let persisted = store.lock().insert_chunk(NewChunk {
            file_id,
            chunk_text: &window.text,
            embedding: embedding.as_deref(),
            start_offset: window.start_offset as i64,
            end_offset: window.end_offset as i64,
            token_count: chunk::estimate_token_count(&window.text) as i64,
        });

        match (persisted, embedding.is_some()) {
            (Ok(_), true) => report.chunks_embedded += 1,
            (Ok(_), false) => report.chunks_failed += 1,
            (Err(e), _) => {
                log::warn!("persisting chunk {index} of {filename} failed: {e}");
                report.chunks_failed += 1;
            }
        }
    }

    store
        .lock()
        .set_processing_status(file_id, ProcessingStatus::Completed)?;

    log::info!(
        "ingested {filename}: {} chunks ({} embedded, {} degraded)",
        report.chunks_total,
        report.chunks_embedded,
        report.chunks_failed
    );

    Ok(report)
}

async fn extract_text(
    provider: &dyn TextProvider,
    bytes: &[u8],
    mime_type: &str,
    format: SourceFormat,
) -> Result<String, IngestError> {
    match format {
        SourceFormat::Media => provider
            .transcribe(bytes, mime_type)
            .await
            .map_err(IngestError::Transcribe),
        other => Ok(extract::extract_document(bytes, other)?),
    }
}
