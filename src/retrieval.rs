//! Similarity ranking over stored knowledge chunks.
//!
//! Embeddings are persisted as little-endian f32 blobs. Retrieval embeds the
//! query through the provider, scores every candidate chunk by cosine
//! similarity, and returns the top K as quotable sources. Chunks without an
//! embedding (the provider failed during ingest) never rank.

use serde::Serialize;

use crate::db::DbKnowledgeChunk;
use crate::util::truncate_chars;

/// Characters of chunk text quoted into the prompt per source.
const SNIPPET_CHARS: usize = 200;

/// A ranked retrieval hit, ready to be quoted into a generation prompt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagSource {
    pub file_id: String,
    pub chunk_id: String,
    pub filename: String,
    pub snippet: String,
    pub relevance: f32,
}

pub fn f32_vec_to_blob(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn blob_to_f32_vec(blob: &[u8]) -> Result<Vec<f32>, String> {
    if blob.len() % 4 != 0 {
        return Err("invalid embedding blob length".to_string());
    }

    let mut values = Vec::with_capacity(blob.len() / 4);
    for chunk in blob.chunks_exact(4) {
        values.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok(values)
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (va, vb) in a.iter().zip(b.iter()) {
        dot += va * vb;
        norm_a += va * va;
        norm_b += vb * vb;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Score `candidates` against the query embedding and keep the best `top_k`.
///
/// Each candidate pairs a chunk with its source filename. Candidates whose
/// embedding is missing or undecodable are skipped.
pub fn rank_chunks(
    query_embedding: &[f32],
    candidates: &[(DbKnowledgeChunk, String)],
    top_k: usize,
) -> Vec<RagSource> {
    let mut scored: Vec<(f32, &DbKnowledgeChunk, &str)> = candidates
        .iter()
        .filter_map(|(chunk, filename)| {
            let blob = chunk.embedding.as_deref()?;
            let embedding = blob_to_f32_vec(blob).ok()?;
            let score = cosine_similarity(query_embedding, &embedding);
            Some((score, chunk, filename.as_str()))
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    scored
        .into_iter()
        .take(top_k)
        .map(|(score, chunk, filename)| {
            let mut snippet = truncate_chars(&chunk.chunk_text, SNIPPET_CHARS).to_string();
            if chunk.chunk_text.chars().count() > SNIPPET_CHARS {
                snippet.push_str("...");
            }
            RagSource {
                file_id: chunk.file_id.clone(),
                chunk_id: chunk.id.clone(),
                filename: filename.to_string(),
                snippet,
                relevance: score,
            }
        })
        .collect()
}
