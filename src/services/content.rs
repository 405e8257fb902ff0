//! Content generation and review operations.
//!
//! `generate_content` runs the whole pipeline: optional retrieval over the
//! organization's knowledge, prompt construction, provider call with
//! template fallback, then one store pass that finds or creates the
//! (brief, channel) request, persists the variants with the first selected,
//! and counts the generation against the usage period. The store lock is
//! never held across a provider await.

use serde::{Deserialize, Serialize};

use super::ServiceError;
use crate::db::{DbContentRequest, DbContentVersion, DbError, RequestDetail, VersionDetail};
use crate::generation::{self, GenerationOutcome};
use crate::retrieval::{self, RagSource};
use crate::state::AppState;
use crate::types::{Channel, UsageKind};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentInput {
    pub brief_id: String,
    pub channel: Channel,
    pub tone: Option<String>,
    #[serde(default = "default_use_rag")]
    pub use_rag: bool,
    pub user_id: String,
}

fn default_use_rag() -> bool {
    true
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub content_request_id: String,
    pub variants: Vec<DbContentVersion>,
    pub model_used: String,
    pub rag_sources: Vec<RagSource>,
}

/// Generate and persist variants for one (brief, channel) pair.
pub async fn generate_content(
    state: &AppState,
    input: &GenerateContentInput,
) -> Result<GenerationResult, ServiceError> {
    let brief = {
        let store = state.store.lock();
        store
            .get_brief(&input.brief_id)?
            .ok_or_else(|| DbError::NotFound {
                entity: "brief",
                id: input.brief_id.clone(),
            })?
    };

    let brief_text = brief.input_text.clone().unwrap_or_default();
    let tone = input.tone.as_deref();

    let rag_sources = if input.use_rag {
        retrieve_sources(state, &brief.organization_id, &brief_text).await
    } else {
        Vec::new()
    };

    let GenerationOutcome {
        mut variants,
        model_used,
    } = generation::generate_variants(
        state.provider.as_ref(),
        &brief_text,
        input.channel,
        tone,
        &rag_sources,
    )
    .await;

    // Variants that do not cite sources inherit the retrieval set, so the
    // persisted version always records what informed it.
    if !rag_sources.is_empty() {
        let all_ids: Vec<String> = rag_sources.iter().map(|s| s.chunk_id.clone()).collect();
        for variant in &mut variants {
            if variant.sources.is_none() {
                variant.sources = Some(all_ids.clone());
            }
        }
    }

    let (request, versions) = {
        let store = state.store.lock();
        let request = store.find_or_create_request(
            &brief.id,
            &brief.organization_id,
            input.channel,
            tone,
            variants.len() as i64,
        )?;
        let versions = store.insert_versions(&request.id, &input.user_id, &model_used, &variants)?;
        store.record_usage(&brief.organization_id, UsageKind::Generation)?;
        (request, versions)
    };

    Ok(GenerationResult {
        content_request_id: request.id,
        variants: versions,
        model_used,
        rag_sources,
    })
}

/// Embed the query and rank the organization's chunks. Any failure here
/// degrades to no sources; retrieval never fails a generation.
async fn retrieve_sources(
    state: &AppState,
    organization_id: &str,
    query: &str,
) -> Vec<RagSource> {
    if query.trim().is_empty() {
        return Vec::new();
    }

    let query_embedding = match state.provider.embed(query).await {
        Ok(vector) => vector,
        Err(e) => {
            log::warn!("retrieval embedding failed: {e}");
            return Vec::new();
        }
    };

    let candidates = {
        let store = state.store.lock();
        match store.org_chunks(organization_id) {
            Ok(candidates) => candidates,
            Err(e) => {
                log::warn!("retrieval candidate query failed: {e}");
                return Vec::new();
            }
        }
    };

    retrieval::rank_chunks(
        &query_embedding,
        &candidates,
        state.config.chunking.rag_top_k,
    )
}

// ---------------------------------------------------------------------------
// Review operations
// ---------------------------------------------------------------------------

pub fn request_detail(state: &AppState, request_id: &str) -> Result<RequestDetail, ServiceError> {
    state
        .store
        .lock()
        .request_detail(request_id)?
        .ok_or_else(|| {
            ServiceError::Db(DbError::NotFound {
                entity: "content request",
                id: request_id.to_string(),
            })
        })
}

pub fn approve(
    state: &AppState,
    request_id: &str,
    approved_by: &str,
) -> Result<DbContentRequest, ServiceError> {
    Ok(state.store.lock().approve_request(request_id, approved_by)?)
}

pub fn reject(
    state: &AppState,
    request_id: &str,
    rejected_by: &str,
    reason: Option<&str>,
) -> Result<DbContentRequest, ServiceError> {
    Ok(state
        .store
        .lock()
        .reject_request(request_id, rejected_by, reason)?)
}

pub fn select_version(state: &AppState, version_id: &str) -> Result<(), ServiceError> {
    Ok(state.store.lock().select_version(version_id)?)
}

pub fn edit_version(
    state: &AppState,
    version_id: &str,
    new_text: &str,
    edited_by: &str,
    reason: Option<&str>,
) -> Result<DbContentVersion, ServiceError> {
    if new_text.trim().is_empty() {
        return Err(ServiceError::validation("content text cannot be empty"));
    }
    Ok(state
        .store
        .lock()
        .update_version_text(version_id, new_text, edited_by, reason)?)
}

pub fn version_detail(state: &AppState, version_id: &str) -> Result<VersionDetail, ServiceError> {
    state
        .store
        .lock()
        .version_detail(version_id)?
        .ok_or_else(|| {
            ServiceError::Db(DbError::NotFound {
                entity: "content version",
                id: version_id.to_string(),
            })
        })
}
