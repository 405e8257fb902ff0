use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::{DbBrief, DbContentRequest, DbContentVersion, DbError, Store, UserSummary};
use crate::types::Channel;
use crate::util::{new_id, now_ms};

fn map_brief(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbBrief> {
    Ok(DbBrief {
        id: row.get(0)?,
        input_text: row.get(1)?,
        input_audio_path: row.get(2)?,
        language: row.get(3)?,
        organization_id: row.get(4)?,
        user_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const BRIEF_COLUMNS: &str =
    "id, input_text, input_audio_path, language, organization_id, user_id, created_at";

/// Creation parameters for a brief and its per-channel requests.
pub struct NewBrief<'a> {
    pub input_text: Option<&'a str>,
    pub input_audio_path: Option<&'a str>,
    pub language: Option<&'a str>,
    pub organization_id: &'a str,
    pub user_id: &'a str,
    pub channels: &'a [Channel],
    pub tone: Option<&'a str>,
    pub variants_requested: Option<i64>,
}

/// Brief detail: the row, its author, and its per-channel requests.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefDetail {
    #[serde(flatten)]
    pub brief: DbBrief,
    pub user: Option<UserSummary>,
    pub content_requests: Vec<DbContentRequest>,
}

/// One request with its most recent version, as assembled for list views.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWithLatest {
    #[serde(flatten)]
    pub request: DbContentRequest,
    pub latest_version: Option<DbContentVersion>,
}

/// Brief overview row for the recent-briefs listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefOverview {
    #[serde(flatten)]
    pub brief: DbBrief,
    pub user: Option<UserSummary>,
    pub content_requests: Vec<RequestWithLatest>,
}

impl Store {
    /// Create a brief and one DRAFTED content request per channel, in one
    /// transaction.
    pub fn create_brief(
        &self,
        new: NewBrief<'_>,
    ) -> Result<(DbBrief, Vec<DbContentRequest>), DbError> {
        let now = now_ms();
        let brief = DbBrief {
            id: new_id(),
            input_text: new.input_text.map(|s| s.to_string()),
            input_audio_path: new.input_audio_path.map(|s| s.to_string()),
            language: new.language.unwrap_or("en").to_string(),
            organization_id: new.organization_id.to_string(),
            user_id: new.user_id.to_string(),
            created_at: now,
        };

        let requests = self.with_transaction(|tx| {
            tx.conn.execute(
                "INSERT INTO briefs (
                    id, input_text, input_audio_path, language,
                    organization_id, user_id, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    brief.id,
                    brief.input_text,
                    brief.input_audio_path,
                    brief.language,
                    brief.organization_id,
                    brief.user_id,
                    brief.created_at,
                ],
            )?;

            let mut requests = Vec::with_capacity(new.channels.len());
            for channel in new.channels {
                requests.push(tx.insert_content_request(
                    &brief.id,
                    new.organization_id,
                    *channel,
                    new.tone,
                    new.variants_requested.unwrap_or(3),
                    now,
                )?);
            }
            Ok(requests)
        })?;

        Ok((brief, requests))
    }

    pub fn get_brief(&self, id: &str) -> Result<Option<DbBrief>, DbError> {
        let brief = self
            .conn
            .query_row(
                &format!("SELECT {BRIEF_COLUMNS} FROM briefs WHERE id = ?1"),
                params![id],
                map_brief,
            )
            .optional()?;
        Ok(brief)
    }

    /// Brief joined with its author and per-channel requests.
    pub fn brief_detail(&self, id: &str) -> Result<Option<BriefDetail>, DbError> {
        let Some(brief) = self.get_brief(id)? else {
            return Ok(None);
        };
        let user = self.user_summary(&brief.user_id)?;
        let content_requests = self.list_requests_by_brief(id)?;
        Ok(Some(BriefDetail {
            brief,
            user,
            content_requests,
        }))
    }

    /// Most recent briefs for an organization, each with its requests and
    /// their latest version.
    pub fn list_recent_briefs(
        &self,
        organization_id: &str,
        limit: usize,
    ) -> Result<Vec<BriefOverview>, DbError> {
        let briefs: Vec<DbBrief> = {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {BRIEF_COLUMNS} FROM briefs
                 WHERE organization_id = ?1
                 ORDER BY created_at DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![organization_id, limit as i64], map_brief)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut overviews = Vec::with_capacity(briefs.len());
        for brief in briefs {
            let user = self.user_summary(&brief.user_id)?;
            let requests = self.list_requests_by_brief(&brief.id)?;
            let mut with_latest = Vec::with_capacity(requests.len());
            for request in requests {
                let latest_version = self.latest_version(&request.id)?;
                with_latest.push(RequestWithLatest {
                    request,
                    latest_version,
                });
            }
            overviews.push(BriefOverview {
                brief,
                user,
                content_requests: with_latest,
            });
        }
        Ok(overviews)
    }

    /// Patch input text / audio path / language. Fails fast when the brief
    /// is missing.
    pub fn update_brief(
        &self,
        id: &str,
        input_text: Option<&str>,
        input_audio_path: Option<&str>,
        language: Option<&str>,
    ) -> Result<(), DbError> {
        let updated = self.conn.execute(
            "UPDATE briefs SET
                input_text = COALESCE(?1, input_text),
                input_audio_path = COALESCE(?2, input_audio_path),
                language = COALESCE(?3, language)
             WHERE id = ?4",
            params![input_text, input_audio_path, language, id],
        )?;
        if updated == 0 {
            return Err(DbError::not_found("brief", id));
        }
        Ok(())
    }

    /// Delete a brief and everything hanging off it:
    /// requests → versions → {comments, media, edit history}, one transaction.
    pub fn delete_brief(&self, id: &str) -> Result<(), DbError> {
        if self.get_brief(id)?.is_none() {
            return Err(DbError::not_found("brief", id));
        }

        self.with_transaction(|tx| {
            let request_ids: Vec<String> = {
                let mut stmt = tx
                    .conn
                    .prepare("SELECT id FROM content_requests WHERE brief_id = ?1")?;
                let rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;
                rows.collect::<Result<Vec<_>, _>>()?
            };

            for request_id in &request_ids {
                let version_ids: Vec<String> = {
                    let mut stmt = tx.conn.prepare(
                        "SELECT id FROM content_versions WHERE content_request_id = ?1",
                    )?;
                    let rows = stmt.query_map(params![request_id], |row| row.get::<_, String>(0))?;
                    rows.collect::<Result<Vec<_>, _>>()?
                };

                for version_id in &version_ids {
                    tx.conn.execute(
                        "DELETE FROM content_comments WHERE content_version_id = ?1",
                        params![version_id],
                    )?;
                    tx.conn.execute(
                        "DELETE FROM media_attachments WHERE content_version_id = ?1",
                        params![version_id],
                    )?;
                    tx.conn.execute(
                        "DELETE FROM content_edit_history WHERE content_version_id = ?1",
                        params![version_id],
                    )?;
                    tx.conn.execute(
                        "DELETE FROM content_versions WHERE id = ?1",
                        params![version_id],
                    )?;
                }

                tx.conn.execute(
                    "DELETE FROM content_requests WHERE id = ?1",
                    params![request_id],
                )?;
            }

            tx.conn.execute("DELETE FROM briefs WHERE id = ?1", params![id])?;
            Ok(())
        })
    }
}
