//! File upload: record the file, count it against usage, run ingestion.
//!
//! Ingestion failure does not fail the upload: the file lands in `failed`
//! with the error logged, and the caller still gets the file id. The
//! report (when ingestion ran) tells the caller how many chunks made it.

use serde::Serialize;

use super::ServiceError;
use crate::db::NewFile;
use crate::ingestion::{self, IngestReport};
use crate::state::AppState;
use crate::types::{StorageKind, UsageKind};
use crate::util::now_ms;

pub struct UploadInput<'a> {
    pub filename: &'a str,
    pub file_type: &'a str,
    pub bytes: &'a [u8],
    pub language: Option<&'a str>,
    pub organization_id: &'a str,
    pub user_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub file_id: String,
    pub filename: String,
    pub size_bytes: i64,
    /// Absent when ingestion aborted (the file is marked failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingest: Option<IngestReport>,
}

/// Accept an upload and ingest it for retrieval.
pub async fn upload_file(
    state: &AppState,
    input: UploadInput<'_>,
) -> Result<UploadResult, ServiceError> {
    if input.filename.trim().is_empty() {
        return Err(ServiceError::validation("filename is required"));
    }
    if input.bytes.is_empty() {
        return Err(ServiceError::validation("file is empty"));
    }
    if input.bytes.len() as u64 > state.config.max_upload_bytes {
        return Err(ServiceError::validation(format!(
            "file exceeds the {} MB limit",
            state.config.max_upload_bytes / (1024 * 1024)
        )));
    }

    let file = {
        let store = state.store.lock();
        let storage_path = format!(
            "uploads/{}/{}-{}",
            input.organization_id,
            now_ms(),
            input.filename
        );
        let file = store.create_file(NewFile {
            filename: input.filename,
            file_type: input.file_type,
            storage_path: &storage_path,
            storage_kind: StorageKind::Platform,
            size_bytes: input.bytes.len() as i64,
            language: input.language,
            organization_id: input.organization_id,
            uploaded_by: input.user_id,
        })?;
        store.record_usage(input.organization_id, UsageKind::FileUpload)?;
        file
    };

    let ingest = match ingestion::ingest_file(
        &state.store,
        state.provider.as_ref(),
        &state.config.chunking,
        &file.id,
        input.bytes,
        input.file_type,
        input.filename,
    )
    .await
    {
        Ok(report) => Some(report),
        Err(e) => {
            log::error!("ingestion failed for {} ({}): {e}", input.filename, file.id);
            None
        }
    };

    Ok(UploadResult {
        file_id: file.id,
        filename: file.filename,
        size_bytes: file.size_bytes,
        ingest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Store;
    use crate::generation::provider::StubProvider;
    use crate::state::SharedState;
    use crate::types::ProcessingStatus;
    use std::sync::Arc;

    fn test_state(provider: StubProvider) -> SharedState {
        let store = Store::open_in_memory().unwrap();
        crate::state::AppState::new(store, Arc::new(provider), Config::default())
    }

    fn seed(state: &AppState) -> (String, String) {
        let store = state.store.lock();
        let org = store
            .create_organization("Acme", "acme", None, None)
            .unwrap();
        let user = store
            .create_user("idp|1", "sam@acme.com", None, None, None, &org.id)
            .unwrap();
        (org.id, user.id)
    }

    #[tokio::test]
    async fn test_upload_ingests_and_counts_usage() {
        let state = test_state(StubProvider::new());
        let (org_id, user_id) = seed(&state);

        let body = "knowledge ".repeat(120);
        let result = upload_file(
            &state,
            UploadInput {
                filename: "handbook.txt",
                file_type: "text/plain",
                bytes: body.as_bytes(),
                language: None,
                organization_id: &org_id,
                user_id: &user_id,
            },
        )
        .await
        .unwrap();

        let report = result.ingest.expect("ingestion ran");
        assert_eq!(report.chunks_total, 3);

        let store = state.store.lock();
        let usage = store
            .current_usage_period(&org_id, now_ms())
            .unwrap()
            .unwrap();
        assert_eq!(usage.files_uploaded_count, 1);
        let file = store.get_file(&result.file_id).unwrap().unwrap();
        assert_eq!(file.processing_status, ProcessingStatus::Completed);
    }

    #[tokio::test]
    async fn test_upload_rejects_empty_and_oversized() {
        let state = test_state(StubProvider::new());
        let (org_id, user_id) = seed(&state);

        let empty = upload_file(
            &state,
            UploadInput {
                filename: "empty.txt",
                file_type: "text/plain",
                bytes: b"",
                language: None,
                organization_id: &org_id,
                user_id: &user_id,
            },
        )
        .await;
        assert!(matches!(empty, Err(ServiceError::Validation(_))));

        let mut small_limit_state = Config::default();
        small_limit_state.max_upload_bytes = 8;
        let state = {
            let store = Store::open_in_memory().unwrap();
            crate::state::AppState::new(store, Arc::new(StubProvider::new()), small_limit_state)
        };
        let (org_id, user_id) = seed(&state);
        let oversized = upload_file(
            &state,
            UploadInput {
                filename: "big.txt",
                file_type: "text/plain",
                bytes: b"way more than eight bytes",
                language: None,
                organization_id: &org_id,
                user_id: &user_id,
            },
        )
        .await;
        assert!(matches!(oversized, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_failed_ingestion_does_not_fail_upload() {
        let state = test_state(StubProvider::failing());
        let (org_id, user_id) = seed(&state);

        // Media requires transcription; the failing stub aborts ingestion.
        let result = upload_file(
            &state,
            UploadInput {
                filename: "call.mp3",
                file_type: "audio/mpeg",
                bytes: b"fake audio",
                language: None,
                organization_id: &org_id,
                user_id: &user_id,
            },
        )
        .await
        .unwrap();

        assert!(result.ingest.is_none());
        let store = state.store.lock();
        let file = store.get_file(&result.file_id).unwrap().unwrap();
        assert_eq!(file.processing_status, ProcessingStatus::Failed);
    }
}
