//! Shared type definitions for the database layer.

use serde::Serialize;
use thiserror::Error;

use crate::types::{
    Channel, ContentStatus, Plan, ProcessingStatus, Role, ScheduleStatus, StorageKind,
};

/// Errors specific to store operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("illegal {entity} transition: {from} -> {to}")]
    IllegalTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("unknown timezone: {0}")]
    InvalidTimezone(String),
}

impl DbError {
    pub(crate) fn not_found(entity: &'static str, id: &str) -> Self {
        DbError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// A row from `organizations`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbOrganization {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub plan: Plan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_subscription_id: Option<String>,
    /// active, canceled, past_due. Opaque to this system.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_subscription_status: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A row from `users`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbUser {
    pub id: String,
    /// Identity-provider subject. Unique across the installation.
    pub external_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub organization_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Compact author projection joined into detail reads.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
}

/// A row from `usage_tracking`: one per organization per rolling 30-day
/// period.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbUsagePeriod {
    pub id: String,
    pub organization_id: String,
    pub period_start: i64,
    pub period_end: i64,
    pub generations_count: i64,
    pub scheduled_posts_count: i64,
    pub files_uploaded_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A row from `briefs`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbBrief {
    pub id: String,
    pub input_text: Option<String>,
    pub input_audio_path: Option<String>,
    pub language: String,
    pub organization_id: String,
    pub user_id: String,
    pub created_at: i64,
}

/// A row from `content_requests`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbContentRequest {
    pub id: String,
    pub brief_id: String,
    pub organization_id: String,
    pub channel: Channel,
    pub tone: Option<String>,
    pub variants_requested: i64,
    pub status: ContentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A row from `content_versions`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbContentVersion {
    pub id: String,
    pub content_request_id: String,
    pub content_text: String,
    pub ai_model_used: String,
    /// JSON array of chunk references, when retrieval informed the variant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rag_sources: Option<String>,
    pub suggested_hashtags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_image_prompt: Option<String>,
    pub user_id: String,
    pub is_selected: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A row from `content_edit_history`. Append-only.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbEditHistoryEntry {
    pub id: String,
    pub content_version_id: String,
    pub previous_text: String,
    pub new_text: String,
    pub edited_by: String,
    pub edit_reason: Option<String>,
    pub created_at: i64,
}

/// A row from `content_comments`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbComment {
    pub id: String,
    pub content_version_id: String,
    pub user_id: String,
    pub comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_comment_id: Option<String>,
    pub is_resolved: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A row from `media_attachments`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbMediaAttachment {
    pub id: String,
    pub content_version_id: String,
    pub filename: String,
    pub file_type: String,
    pub storage_path: String,
    pub storage_kind: StorageKind,
    pub size_bytes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    /// Serialized `ChannelMeta`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    pub uploaded_by: String,
    pub created_at: i64,
}

/// A row from `files`: uploaded organizational knowledge.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbFile {
    pub id: String,
    pub filename: String,
    pub file_type: String,
    pub storage_path: String,
    pub storage_kind: StorageKind,
    pub size_bytes: i64,
    pub language: String,
    pub organization_id: String,
    pub uploaded_by: String,
    pub processing_status: ProcessingStatus,
    pub created_at: i64,
}

/// A row from `knowledge_chunks`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbKnowledgeChunk {
    pub id: String,
    pub file_id: String,
    pub chunk_text: String,
    /// Little-endian f32 vector; absent when embedding failed during ingest.
    #[serde(skip_serializing)]
    pub embedding: Option<Vec<u8>>,
    pub start_offset: i64,
    pub end_offset: i64,
    pub token_count: i64,
    pub created_at: i64,
}

/// A row from `platform_connections`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbPlatformConnection {
    pub id: String,
    pub organization_id: String,
    pub platform: Channel,
    pub account_id: String,
    pub account_name: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<i64>,
    pub is_active: bool,
    /// Serialized `ConnectionMeta`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    pub connected_by: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A row from `schedules`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbSchedule {
    pub id: String,
    pub content_version_id: String,
    pub organization_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_connection_id: Option<String>,
    pub scheduled_at: i64,
    pub timezone: String,
    /// Serialized `ChannelMeta`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_meta: Option<String>,
    pub status: ScheduleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_post_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub retry_count: i64,
    pub max_retries: i64,
    pub is_recurring: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence_end_date: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_schedule_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A row from `published_posts`, written exactly once per published
/// schedule.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbPublishedPost {
    pub id: String,
    pub schedule_id: String,
    pub content_version_id: String,
    pub organization_id: String,
    pub platform_connection_id: String,
    pub platform_post_id: String,
    pub platform_post_url: String,
    pub published_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    pub created_at: i64,
}

/// A row from `engagement_events`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbEngagementEvent {
    pub id: String,
    pub organization_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_version_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_post_id: Option<String>,
    /// like, comment, impression, click, share, save
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<String>,
    pub timestamp: i64,
}

/// A row from `analytics_aggregates`: period-bucketed additive rollups.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbAnalyticsAggregate {
    pub id: String,
    pub organization_id: String,
    /// daily, weekly, monthly
    pub period: String,
    pub period_start: i64,
    pub period_end: i64,
    pub impressions: i64,
    pub engagement: i64,
    pub clicks: i64,
    pub shares: i64,
    pub saves: i64,
    pub created_at: i64,
}
