use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::{
    DbComment, DbContentRequest, DbContentVersion, DbEditHistoryEntry, DbError,
    DbMediaAttachment, Store, UserSummary,
};
use crate::types::{Channel, ContentStatus, ContentVariant, StorageKind};
use crate::util::{new_id, now_ms};

fn map_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbContentRequest> {
    Ok(DbContentRequest {
        id: row.get(0)?,
        brief_id: row.get(1)?,
        organization_id: row.get(2)?,
        channel: row.get(3)?,
        tone: row.get(4)?,
        variants_requested: row.get(5)?,
        status: row.get(6)?,
        approved_by: row.get(7)?,
        approved_at: row.get(8)?,
        rejected_by: row.get(9)?,
        rejected_at: row.get(10)?,
        rejection_reason: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

const REQUEST_COLUMNS: &str = "id, brief_id, organization_id, channel, tone, \
     variants_requested, status, approved_by, approved_at, rejected_by, \
     rejected_at, rejection_reason, created_at, updated_at";

fn map_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbContentVersion> {
    let hashtags_json: Option<String> = row.get(5)?;
    let suggested_hashtags = hashtags_json
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();
    Ok(DbContentVersion {
        id: row.get(0)?,
        content_request_id: row.get(1)?,
        content_text: row.get(2)?,
        ai_model_used: row.get(3)?,
        rag_sources: row.get(4)?,
        suggested_hashtags,
        suggested_image_prompt: row.get(6)?,
        user_id: row.get(7)?,
        is_selected: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

const VERSION_COLUMNS: &str = "id, content_request_id, content_text, ai_model_used, \
     rag_sources, suggested_hashtags, suggested_image_prompt, user_id, \
     is_selected, created_at, updated_at";

fn map_history(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbEditHistoryEntry> {
    Ok(DbEditHistoryEntry {
        id: row.get(0)?,
        content_version_id: row.get(1)?,
        previous_text: row.get(2)?,
        new_text: row.get(3)?,
        edited_by: row.get(4)?,
        edit_reason: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_comment(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbComment> {
    Ok(DbComment {
        id: row.get(0)?,
        content_version_id: row.get(1)?,
        user_id: row.get(2)?,
        comment: row.get(3)?,
        parent_comment_id: row.get(4)?,
        is_resolved: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

const COMMENT_COLUMNS: &str = "id, content_version_id, user_id, comment, \
     parent_comment_id, is_resolved, created_at, updated_at";

fn map_media(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbMediaAttachment> {
    Ok(DbMediaAttachment {
        id: row.get(0)?,
        content_version_id: row.get(1)?,
        filename: row.get(2)?,
        file_type: row.get(3)?,
        storage_path: row.get(4)?,
        storage_kind: row.get(5)?,
        size_bytes: row.get(6)?,
        width: row.get(7)?,
        height: row.get(8)?,
        alt_text: row.get(9)?,
        metadata: row.get(10)?,
        uploaded_by: row.get(11)?,
        created_at: row.get(12)?,
    })
}

const MEDIA_COLUMNS: &str = "id, content_version_id, filename, file_type, storage_path, \
     storage_kind, size_bytes, width, height, alt_text, metadata, uploaded_by, created_at";

/// Request detail: the row plus all of its versions.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetail {
    #[serde(flatten)]
    pub request: DbContentRequest,
    pub versions: Vec<DbContentVersion>,
}

/// Version detail: the row plus edit history, comments, and media.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDetail {
    #[serde(flatten)]
    pub version: DbContentVersion,
    pub edit_history: Vec<DbEditHistoryEntry>,
    pub comments: Vec<CommentWithAuthor>,
    pub media: Vec<DbMediaAttachment>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentWithAuthor {
    #[serde(flatten)]
    pub comment: DbComment,
    pub user: Option<UserSummary>,
}

/// Creation parameters for a media attachment.
pub struct NewMedia<'a> {
    pub content_version_id: &'a str,
    pub filename: &'a str,
    pub file_type: &'a str,
    pub storage_path: &'a str,
    pub storage_kind: StorageKind,
    pub size_bytes: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub alt_text: Option<&'a str>,
    pub metadata: Option<&'a str>,
    pub uploaded_by: &'a str,
}

impl Store {
    // =========================================================================
    // Content requests
    // =========================================================================

    pub(crate) fn insert_content_request(
        &self,
        brief_id: &str,
        organization_id: &str,
        channel: Channel,
        tone: Option<&str>,
        variants_requested: i64,
        now: i64,
    ) -> Result<DbContentRequest, DbError> {
        let request = DbContentRequest {
            id: new_id(),
            brief_id: brief_id.to_string(),
            organization_id: organization_id.to_string(),
            channel,
            tone: tone.map(|s| s.to_string()),
            variants_requested,
            status: ContentStatus::Drafted,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        };

        self.conn.execute(
            "INSERT INTO content_requests (
                id, brief_id, organization_id, channel, tone,
                variants_requested, status, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                request.id,
                request.brief_id,
                request.organization_id,
                request.channel,
                request.tone,
                request.variants_requested,
                request.status,
                request.created_at,
                request.updated_at,
            ],
        )?;

        Ok(request)
    }

    /// The one request for (brief, channel), creating it DRAFTED when absent.
    ///
    /// The UNIQUE (brief_id, channel) index makes the create idempotent under
    /// concurrent callers: the loser of the race falls through to the select.
    pub fn find_or_create_request(
        &self,
        brief_id: &str,
        organization_id: &str,
        channel: Channel,
        tone: Option<&str>,
        variants_requested: i64,
    ) -> Result<DbContentRequest, DbError> {
        self.with_transaction(|tx| {
            let existing = tx
                .conn
                .query_row(
                    &format!(
                        "SELECT {REQUEST_COLUMNS} FROM content_requests
                         WHERE brief_id = ?1 AND channel = ?2"
                    ),
                    params![brief_id, channel],
                    map_request,
                )
                .optional()?;

            match existing {
                Some(request) => Ok(request),
                None => tx.insert_content_request(
                    brief_id,
                    organization_id,
                    channel,
                    tone,
                    variants_requested,
                    now_ms(),
                ),
            }
        })
    }

    pub fn get_request(&self, id: &str) -> Result<Option<DbContentRequest>, DbError> {
        let request = self
            .conn
            .query_row(
                &format!("SELECT {REQUEST_COLUMNS} FROM content_requests WHERE id = ?1"),
                params![id],
                map_request,
            )
            .optional()?;
        Ok(request)
    }

    pub fn request_detail(&self, id: &str) -> Result<Option<RequestDetail>, DbError> {
        let Some(request) = self.get_request(id)? else {
            return Ok(None);
        };
        let versions = self.list_versions(id)?;
        Ok(Some(RequestDetail { request, versions }))
    }

    pub fn list_requests_by_brief(&self, brief_id: &str) -> Result<Vec<DbContentRequest>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REQUEST_COLUMNS} FROM content_requests
             WHERE brief_id = ?1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![brief_id], map_request)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn list_requests_by_status(
        &self,
        organization_id: &str,
        status: ContentStatus,
    ) -> Result<Vec<DbContentRequest>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REQUEST_COLUMNS} FROM content_requests
             WHERE organization_id = ?1 AND status = ?2
             ORDER BY updated_at DESC"
        ))?;
        let rows = stmt.query_map(params![organization_id, status], map_request)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Guarded status move. Reads the current status inside the caller's
    /// transaction (or autocommit), validates against the transition table,
    /// and refuses illegal moves instead of patching blindly.
    pub(crate) fn transition_request(
        &self,
        id: &str,
        next: ContentStatus,
    ) -> Result<DbContentRequest, DbError> {
        let current = self
            .get_request(id)?
            .ok_or_else(|| DbError::not_found("content request", id))?;

        if !current.status.can_transition_to(next) {
            return Err(DbError::IllegalTransition {
                entity: "content request",
                from: current.status.to_string(),
                to: next.to_string(),
            });
        }

        self.conn.execute(
            "UPDATE content_requests SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![next, now_ms(), id],
        )?;

        self.get_request(id)?
            .ok_or_else(|| DbError::not_found("content request", id))
    }

    pub fn approve_request(
        &self,
        id: &str,
        approved_by: &str,
    ) -> Result<DbContentRequest, DbError> {
        self.with_transaction(|tx| {
            tx.transition_request(id, ContentStatus::Approved)?;
            tx.conn.execute(
                "UPDATE content_requests SET approved_by = ?1, approved_at = ?2 WHERE id = ?3",
                params![approved_by, now_ms(), id],
            )?;
            tx.get_request(id)?
                .ok_or_else(|| DbError::not_found("content request", id))
        })
    }

    pub fn reject_request(
        &self,
        id: &str,
        rejected_by: &str,
        rejection_reason: Option<&str>,
    ) -> Result<DbContentRequest, DbError> {
        self.with_transaction(|tx| {
            tx.transition_request(id, ContentStatus::Rejected)?;
            tx.conn.execute(
                "UPDATE content_requests
                 SET rejected_by = ?1, rejected_at = ?2, rejection_reason = ?3
                 WHERE id = ?4",
                params![rejected_by, now_ms(), rejection_reason, id],
            )?;
            tx.get_request(id)?
                .ok_or_else(|| DbError::not_found("content request", id))
        })
    }

    // =========================================================================
    // Content versions
    // =========================================================================

    /// Persist a batch of generated variants as versions of a request. The
    /// first variant becomes the selected one; any previously selected
    /// sibling is unselected in the same transaction, so exactly one version
    /// is selected afterwards. A REJECTED request reopens to DRAFTED.
    pub fn insert_versions(
        &self,
        content_request_id: &str,
        user_id: &str,
        model_used: &str,
        variants: &[ContentVariant],
    ) -> Result<Vec<DbContentVersion>, DbError> {
        self.with_transaction(|tx| {
            let request = tx
                .get_request(content_request_id)?
                .ok_or_else(|| DbError::not_found("content request", content_request_id))?;

            if request.status == ContentStatus::Rejected {
                tx.transition_request(content_request_id, ContentStatus::Drafted)?;
            }

            tx.conn.execute(
                "UPDATE content_versions SET is_selected = 0, updated_at = ?1
                 WHERE content_request_id = ?2",
                params![now_ms(), content_request_id],
            )?;

            let now = now_ms();
            let mut versions = Vec::with_capacity(variants.len());
            for (index, variant) in variants.iter().enumerate() {
                let version = DbContentVersion {
                    id: new_id(),
                    content_request_id: content_request_id.to_string(),
                    content_text: variant.text.clone(),
                    ai_model_used: model_used.to_string(),
                    rag_sources: variant
                        .sources
                        .as_ref()
                        .map(|s| serde_json::to_string(s).unwrap_or_default()),
                    suggested_hashtags: variant.suggested_hashtags.clone(),
                    suggested_image_prompt: variant.suggested_image_prompt.clone(),
                    user_id: user_id.to_string(),
                    is_selected: index == 0,
                    created_at: now,
                    updated_at: now,
                };

                tx.conn.execute(
                    "INSERT INTO content_versions (
                        id, content_request_id, content_text, ai_model_used,
                        rag_sources, suggested_hashtags, suggested_image_prompt,
                        user_id, is_selected, created_at, updated_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        version.id,
                        version.content_request_id,
                        version.content_text,
                        version.ai_model_used,
                        version.rag_sources,
                        serde_json::to_string(&version.suggested_hashtags)
                            .unwrap_or_else(|_| "[]".to_string()),
                        version.suggested_image_prompt,
                        version.user_id,
                        version.is_selected,
                        version.created_at,
                        version.updated_at,
                    ],
                )?;
                versions.push(version);
            }

            Ok(versions)
        })
    }

    pub fn get_version(&self, id: &str) -> Result<Option<DbContentVersion>, DbError> {
        let version = self
            .conn
            .query_row(
                &format!("SELECT {VERSION_COLUMNS} FROM content_versions WHERE id = ?1"),
                params![id],
                map_version,
            )
            .optional()?;
        Ok(version)
    }

    pub fn list_versions(
        &self,
        content_request_id: &str,
    ) -> Result<Vec<DbContentVersion>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {VERSION_COLUMNS} FROM content_versions
             WHERE content_request_id = ?1 ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![content_request_id], map_version)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Most recent version of a request, for list assembly.
    pub(crate) fn latest_version(
        &self,
        content_request_id: &str,
    ) -> Result<Option<DbContentVersion>, DbError> {
        let version = self
            .conn
            .query_row(
                &format!(
                    "SELECT {VERSION_COLUMNS} FROM content_versions
                     WHERE content_request_id = ?1
                     ORDER BY created_at DESC, id DESC
                     LIMIT 1"
                ),
                params![content_request_id],
                map_version,
            )
            .optional()?;
        Ok(version)
    }

    /// Version plus its edit history (newest first), comments, and media.
    pub fn version_detail(&self, id: &str) -> Result<Option<VersionDetail>, DbError> {
        let Some(version) = self.get_version(id)? else {
            return Ok(None);
        };
        let edit_history = self.list_edit_history(id)?;
        let comments = self.list_comments(id)?;
        let media = self.list_media(id)?;
        Ok(Some(VersionDetail {
            version,
            edit_history,
            comments,
            media,
        }))
    }

    /// Replace the text of a version, appending the previous → new pair to
    /// the edit history in the same transaction.
    pub fn update_version_text(
        &self,
        id: &str,
        new_text: &str,
        edited_by: &str,
        edit_reason: Option<&str>,
    ) -> Result<DbContentVersion, DbError> {
        self.with_transaction(|tx| {
            let version = tx
                .get_version(id)?
                .ok_or_else(|| DbError::not_found("content version", id))?;

            let now = now_ms();
            tx.conn.execute(
                "INSERT INTO content_edit_history (
                    id, content_version_id, previous_text, new_text,
                    edited_by, edit_reason, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    new_id(),
                    id,
                    version.content_text,
                    new_text,
                    edited_by,
                    edit_reason,
                    now,
                ],
            )?;

            tx.conn.execute(
                "UPDATE content_versions SET content_text = ?1, updated_at = ?2 WHERE id = ?3",
                params![new_text, now, id],
            )?;

            tx.get_version(id)?
                .ok_or_else(|| DbError::not_found("content version", id))
        })
    }

    /// Make `version_id` the selected version of its request.
    ///
    /// A single statement rewrites every sibling with
    /// `is_selected = (id = chosen)`, so no reader can observe zero or two
    /// selected versions.
    pub fn select_version(&self, version_id: &str) -> Result<(), DbError> {
        let version = self
            .get_version(version_id)?
            .ok_or_else(|| DbError::not_found("content version", version_id))?;

        self.conn.execute(
            "UPDATE content_versions
             SET is_selected = (id = ?1), updated_at = ?2
             WHERE content_request_id = ?3",
            params![version_id, now_ms(), version.content_request_id],
        )?;
        Ok(())
    }

    pub fn list_edit_history(
        &self,
        content_version_id: &str,
    ) -> Result<Vec<DbEditHistoryEntry>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, content_version_id, previous_text, new_text, edited_by,
                    edit_reason, created_at
             FROM content_edit_history
             WHERE content_version_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![content_version_id], map_history)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // =========================================================================
    // Comments
    // =========================================================================

    pub fn create_comment(
        &self,
        content_version_id: &str,
        user_id: &str,
        comment: &str,
        parent_comment_id: Option<&str>,
    ) -> Result<DbComment, DbError> {
        if self.get_version(content_version_id)?.is_none() {
            return Err(DbError::not_found("content version", content_version_id));
        }

        let now = now_ms();
        let row = DbComment {
            id: new_id(),
            content_version_id: content_version_id.to_string(),
            user_id: user_id.to_string(),
            comment: comment.to_string(),
            parent_comment_id: parent_comment_id.map(|s| s.to_string()),
            is_resolved: false,
            created_at: now,
            updated_at: now,
        };

        self.conn.execute(
            "INSERT INTO content_comments (
                id, content_version_id, user_id, comment, parent_comment_id,
                is_resolved, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
            params![
                row.id,
                row.content_version_id,
                row.user_id,
                row.comment,
                row.parent_comment_id,
                row.created_at,
                row.updated_at,
            ],
        )?;

        Ok(row)
    }

    /// Comments on a version, newest first, each with its author.
    pub fn list_comments(
        &self,
        content_version_id: &str,
    ) -> Result<Vec<CommentWithAuthor>, DbError> {
        let comments: Vec<DbComment> = {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {COMMENT_COLUMNS} FROM content_comments
                 WHERE content_version_id = ?1
                 ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt.query_map(params![content_version_id], map_comment)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut out = Vec::with_capacity(comments.len());
        for comment in comments {
            let user = self.user_summary(&comment.user_id)?;
            out.push(CommentWithAuthor { comment, user });
        }
        Ok(out)
    }

    pub fn update_comment(
        &self,
        id: &str,
        comment: Option<&str>,
        is_resolved: Option<bool>,
    ) -> Result<(), DbError> {
        let updated = self.conn.execute(
            "UPDATE content_comments SET
                comment = COALESCE(?1, comment),
                is_resolved = COALESCE(?2, is_resolved),
                updated_at = ?3
             WHERE id = ?4",
            params![comment, is_resolved, now_ms(), id],
        )?;
        if updated == 0 {
            return Err(DbError::not_found("comment", id));
        }
        Ok(())
    }

    pub fn resolve_comment(&self, id: &str) -> Result<(), DbError> {
        self.update_comment(id, None, Some(true))
    }

    pub fn delete_comment(&self, id: &str) -> Result<(), DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM content_comments WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::not_found("comment", id));
        }
        Ok(())
    }

    // =========================================================================
    // Media attachments
    // =========================================================================

    pub fn add_media(&self, new: NewMedia<'_>) -> Result<DbMediaAttachment, DbError> {
        if self.get_version(new.content_version_id)?.is_none() {
            return Err(DbError::not_found(
                "content version",
                new.content_version_id,
            ));
        }

        let row = DbMediaAttachment {
            id: new_id(),
            content_version_id: new.content_version_id.to_string(),
            filename: new.filename.to_string(),
            file_type: new.file_type.to_string(),
            storage_path: new.storage_path.to_string(),
            storage_kind: new.storage_kind,
            size_bytes: new.size_bytes,
            width: new.width,
            height: new.height,
            alt_text: new.alt_text.map(|s| s.to_string()),
            metadata: new.metadata.map(|s| s.to_string()),
            uploaded_by: new.uploaded_by.to_string(),
            created_at: now_ms(),
        };

        self.conn.execute(
            "INSERT INTO media_attachments (
                id, content_version_id, filename, file_type, storage_path,
                storage_kind, size_bytes, width, height, alt_text, metadata,
                uploaded_by, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                row.id,
                row.content_version_id,
                row.filename,
                row.file_type,
                row.storage_path,
                row.storage_kind,
                row.size_bytes,
                row.width,
                row.height,
                row.alt_text,
                row.metadata,
                row.uploaded_by,
                row.created_at,
            ],
        )?;

        Ok(row)
    }

    pub fn list_media(
        &self,
        content_version_id: &str,
    ) -> Result<Vec<DbMediaAttachment>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media_attachments
             WHERE content_version_id = ?1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![content_version_id], map_media)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn delete_media(&self, id: &str) -> Result<(), DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM media_attachments WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::not_found("media attachment", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewBrief;
    use crate::generation::fallback_variants;

    fn seed(store: &Store) -> (String, String, DbContentRequest) {
        let org = store
            .create_organization("Acme", "acme", None, None)
            .unwrap();
        let user = store
            .create_user("idp|1", "sam@acme.com", None, None, None, &org.id)
            .unwrap();
        let (_, requests) = store
            .create_brief(NewBrief {
                input_text: Some("Announce the beta"),
                input_audio_path: None,
                language: None,
                organization_id: &org.id,
                user_id: &user.id,
                channels: &[Channel::Instagram],
                tone: None,
                variants_requested: None,
            })
            .unwrap();
        (org.id, user.id, requests.into_iter().next().unwrap())
    }

    #[test]
    fn test_find_or_create_is_idempotent_per_channel() {
        let store = Store::open_in_memory().unwrap();
        let (org_id, _, request) = seed(&store);

        let again = store
            .find_or_create_request(&request.brief_id, &org_id, Channel::Instagram, None, 3)
            .unwrap();
        assert_eq!(again.id, request.id);

        let other = store
            .find_or_create_request(&request.brief_id, &org_id, Channel::Email, None, 3)
            .unwrap();
        assert_ne!(other.id, request.id);
        assert_eq!(other.channel, Channel::Email);
    }

    #[test]
    fn test_insert_versions_selects_first_exclusively() {
        let store = Store::open_in_memory().unwrap();
        let (_, user_id, request) = seed(&store);

        let first_batch = store
            .insert_versions(&request.id, &user_id, "gpt-4o", &fallback_variants("Beta"))
            .unwrap();
        assert_eq!(first_batch.len(), 3);
        assert!(first_batch[0].is_selected);

        // Regeneration: the new first variant takes over the selection.
        let second_batch = store
            .insert_versions(&request.id, &user_id, "gpt-4o", &fallback_variants("Beta"))
            .unwrap();

        let versions = store.list_versions(&request.id).unwrap();
        assert_eq!(versions.len(), 6);
        let selected: Vec<_> = versions.iter().filter(|v| v.is_selected).collect();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, second_batch[0].id);
    }

    #[test]
    fn test_select_version_exclusivity() {
        let store = Store::open_in_memory().unwrap();
        let (_, user_id, request) = seed(&store);
        let versions = store
            .insert_versions(&request.id, &user_id, "gpt-4o", &fallback_variants("Beta"))
            .unwrap();

        store.select_version(&versions[2].id).unwrap();

        let after = store.list_versions(&request.id).unwrap();
        for v in &after {
            assert_eq!(v.is_selected, v.id == versions[2].id);
        }

        assert!(matches!(
            store.select_version("missing").unwrap_err(),
            DbError::NotFound { .. }
        ));
    }

    #[test]
    fn test_edit_appends_history() {
        let store = Store::open_in_memory().unwrap();
        let (_, user_id, request) = seed(&store);
        let versions = store
            .insert_versions(&request.id, &user_id, "gpt-4o", &fallback_variants("Beta"))
            .unwrap();
        let version = &versions[0];

        let updated = store
            .update_version_text(&version.id, "Edited copy", &user_id, Some("tone fix"))
            .unwrap();
        assert_eq!(updated.content_text, "Edited copy");

        let history = store.list_edit_history(&version.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].previous_text, version.content_text);
        assert_eq!(history[0].new_text, "Edited copy");
        assert_eq!(history[0].edit_reason.as_deref(), Some("tone fix"));
    }

    #[test]
    fn test_status_transitions_guarded() {
        let store = Store::open_in_memory().unwrap();
        let (_, user_id, request) = seed(&store);

        // Cannot publish a drafted request directly.
        assert!(matches!(
            store
                .transition_request(&request.id, ContentStatus::Published)
                .unwrap_err(),
            DbError::IllegalTransition { .. }
        ));

        let approved = store.approve_request(&request.id, &user_id).unwrap();
        assert_eq!(approved.status, ContentStatus::Approved);
        assert_eq!(approved.approved_by.as_deref(), Some(user_id.as_str()));

        let rejected = store
            .reject_request(&request.id, &user_id, Some("off brand"))
            .unwrap();
        assert_eq!(rejected.status, ContentStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("off brand"));

        // A rejected request cannot be approved again without regeneration.
        assert!(matches!(
            store.approve_request(&request.id, &user_id).unwrap_err(),
            DbError::IllegalTransition { .. }
        ));

        // Regeneration reopens it.
        store
            .insert_versions(&request.id, &user_id, "gpt-4o", &fallback_variants("Beta"))
            .unwrap();
        let reopened = store.get_request(&request.id).unwrap().unwrap();
        assert_eq!(reopened.status, ContentStatus::Drafted);
    }

    #[test]
    fn test_comment_thread_and_resolution() {
        let store = Store::open_in_memory().unwrap();
        let (_, user_id, request) = seed(&store);
        let versions = store
            .insert_versions(&request.id, &user_id, "gpt-4o", &fallback_variants("Beta"))
            .unwrap();

        let root = store
            .create_comment(&versions[0].id, &user_id, "shorter?", None)
            .unwrap();
        let reply = store
            .create_comment(&versions[0].id, &user_id, "done", Some(&root.id))
            .unwrap();
        assert_eq!(reply.parent_comment_id.as_deref(), Some(root.id.as_str()));

        store.resolve_comment(&root.id).unwrap();
        let comments = store.list_comments(&versions[0].id).unwrap();
        let root_row = comments
            .iter()
            .find(|c| c.comment.id == root.id)
            .unwrap();
        assert!(root_row.comment.is_resolved);
        assert!(root_row.user.is_some());

        assert!(matches!(
            store
                .create_comment("missing", &user_id, "x", None)
                .unwrap_err(),
            DbError::NotFound { .. }
        ));
    }
}
