use std::str::FromStr;

use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::{
    DbContentVersion, DbError, DbPlatformConnection, DbPublishedPost, DbSchedule, Store,
};
use crate::types::{Channel, ContentStatus, ScheduleStatus};
use crate::util::{new_id, now_ms};

fn map_connection(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbPlatformConnection> {
    Ok(DbPlatformConnection {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        platform: row.get(2)?,
        account_id: row.get(3)?,
        account_name: row.get(4)?,
        access_token: row.get(5)?,
        refresh_token: row.get(6)?,
        token_expires_at: row.get(7)?,
        is_active: row.get(8)?,
        metadata: row.get(9)?,
        connected_by: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

const CONNECTION_COLUMNS: &str = "id, organization_id, platform, account_id, account_name, \
     access_token, refresh_token, token_expires_at, is_active, metadata, \
     connected_by, created_at, updated_at";

fn map_schedule(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbSchedule> {
    Ok(DbSchedule {
        id: row.get(0)?,
        content_version_id: row.get(1)?,
        organization_id: row.get(2)?,
        platform_connection_id: row.get(3)?,
        scheduled_at: row.get(4)?,
        timezone: row.get(5)?,
        channel_meta: row.get(6)?,
        status: row.get(7)?,
        published_at: row.get(8)?,
        published_post_id: row.get(9)?,
        published_post_url: row.get(10)?,
        error_message: row.get(11)?,
        retry_count: row.get(12)?,
        max_retries: row.get(13)?,
        is_recurring: row.get(14)?,
        recurrence_pattern: row.get(15)?,
        recurrence_end_date: row.get(16)?,
        parent_schedule_id: row.get(17)?,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
    })
}

const SCHEDULE_COLUMNS: &str = "id, content_version_id, organization_id, \
     platform_connection_id, scheduled_at, timezone, channel_meta, status, \
     published_at, published_post_id, published_post_url, error_message, \
     retry_count, max_retries, is_recurring, recurrence_pattern, \
     recurrence_end_date, parent_schedule_id, created_at, updated_at";

fn map_published(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbPublishedPost> {
    Ok(DbPublishedPost {
        id: row.get(0)?,
        schedule_id: row.get(1)?,
        content_version_id: row.get(2)?,
        organization_id: row.get(3)?,
        platform_connection_id: row.get(4)?,
        platform_post_id: row.get(5)?,
        platform_post_url: row.get(6)?,
        published_at: row.get(7)?,
        metadata: row.get(8)?,
        created_at: row.get(9)?,
    })
}

const PUBLISHED_COLUMNS: &str = "id, schedule_id, content_version_id, organization_id, \
     platform_connection_id, platform_post_id, platform_post_url, published_at, \
     metadata, created_at";

/// Creation parameters for a platform connection.
pub struct NewConnection<'a> {
    pub organization_id: &'a str,
    pub platform: Channel,
    pub account_id: &'a str,
    pub account_name: &'a str,
    pub access_token: &'a str,
    pub refresh_token: Option<&'a str>,
    pub token_expires_at: Option<i64>,
    /// Serialized `ConnectionMeta`.
    pub metadata: Option<&'a str>,
    pub connected_by: &'a str,
}

/// Creation parameters for a schedule.
pub struct NewSchedule<'a> {
    pub content_version_id: &'a str,
    pub organization_id: &'a str,
    pub platform_connection_id: Option<&'a str>,
    pub scheduled_at: i64,
    pub timezone: &'a str,
    /// Serialized `ChannelMeta`.
    pub channel_meta: Option<&'a str>,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<&'a str>,
    pub recurrence_end_date: Option<i64>,
    pub max_retries: Option<i64>,
}

/// Schedule listing row joined with its version, connection, and published
/// post (when any).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleOverview {
    #[serde(flatten)]
    pub schedule: DbSchedule,
    pub content_version: Option<DbContentVersion>,
    pub platform_connection: Option<DbPlatformConnection>,
    pub published_post: Option<DbPublishedPost>,
}

impl Store {
    // =========================================================================
    // Platform connections
    // =========================================================================

    pub fn create_connection(
        &self,
        new: NewConnection<'_>,
    ) -> Result<DbPlatformConnection, DbError> {
        let now = now_ms();
        let row = DbPlatformConnection {
            id: new_id(),
            organization_id: new.organization_id.to_string(),
            platform: new.platform,
            account_id: new.account_id.to_string(),
            account_name: new.account_name.to_string(),
            access_token: new.access_token.to_string(),
            refresh_token: new.refresh_token.map(|s| s.to_string()),
            token_expires_at: new.token_expires_at,
            is_active: true,
            metadata: new.metadata.map(|s| s.to_string()),
            connected_by: new.connected_by.to_string(),
            created_at: now,
            updated_at: now,
        };

        self.conn.execute(
            "INSERT INTO platform_connections (
                id, organization_id, platform, account_id, account_name,
                access_token, refresh_token, token_expires_at, is_active,
                metadata, connected_by, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?10, ?11, ?12)",
            params![
                row.id,
                row.organization_id,
                row.platform,
                row.account_id,
                row.account_name,
                row.access_token,
                row.refresh_token,
                row.token_expires_at,
                row.metadata,
                row.connected_by,
                row.created_at,
                row.updated_at,
            ],
        )?;

        Ok(row)
    }

    pub fn get_connection(&self, id: &str) -> Result<Option<DbPlatformConnection>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {CONNECTION_COLUMNS} FROM platform_connections WHERE id = ?1"),
                params![id],
                map_connection,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_connections(
        &self,
        organization_id: &str,
    ) -> Result<Vec<DbPlatformConnection>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM platform_connections
             WHERE organization_id = ?1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![organization_id], map_connection)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn list_active_connections(
        &self,
        organization_id: &str,
    ) -> Result<Vec<DbPlatformConnection>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM platform_connections
             WHERE organization_id = ?1 AND is_active = 1
             ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![organization_id], map_connection)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn connections_by_platform(
        &self,
        organization_id: &str,
        platform: Channel,
    ) -> Result<Vec<DbPlatformConnection>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM platform_connections
             WHERE organization_id = ?1 AND platform = ?2
             ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![organization_id, platform], map_connection)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn update_connection(
        &self,
        id: &str,
        account_name: Option<&str>,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
        token_expires_at: Option<i64>,
        metadata: Option<&str>,
    ) -> Result<(), DbError> {
        let updated = self.conn.execute(
            "UPDATE platform_connections SET
                account_name = COALESCE(?1, account_name),
                access_token = COALESCE(?2, access_token),
                refresh_token = COALESCE(?3, refresh_token),
                token_expires_at = COALESCE(?4, token_expires_at),
                metadata = COALESCE(?5, metadata),
                updated_at = ?6
             WHERE id = ?7",
            params![
                account_name,
                access_token,
                refresh_token,
                token_expires_at,
                metadata,
                now_ms(),
                id,
            ],
        )?;
        if updated == 0 {
            return Err(DbError::not_found("platform connection", id));
        }
        Ok(())
    }

    pub fn deactivate_connection(&self, id: &str) -> Result<(), DbError> {
        let updated = self.conn.execute(
            "UPDATE platform_connections SET is_active = 0, updated_at = ?1 WHERE id = ?2",
            params![now_ms(), id],
        )?;
        if updated == 0 {
            return Err(DbError::not_found("platform connection", id));
        }
        Ok(())
    }

    // =========================================================================
    // Schedules
    // =========================================================================

    /// Create a PENDING schedule for a content version and move the owning
    /// request APPROVED→SCHEDULED, in one transaction. The timezone must be
    /// a valid IANA name.
    pub fn create_schedule(&self, new: NewSchedule<'_>) -> Result<DbSchedule, DbError> {
        if chrono_tz::Tz::from_str(new.timezone).is_err() {
            return Err(DbError::InvalidTimezone(new.timezone.to_string()));
        }

        let now = now_ms();
        let schedule = DbSchedule {
            id: new_id(),
            content_version_id: new.content_version_id.to_string(),
            organization_id: new.organization_id.to_string(),
            platform_connection_id: new.platform_connection_id.map(|s| s.to_string()),
            scheduled_at: new.scheduled_at,
            timezone: new.timezone.to_string(),
            channel_meta: new.channel_meta.map(|s| s.to_string()),
            status: ScheduleStatus::Pending,
            published_at: None,
            published_post_id: None,
            published_post_url: None,
            error_message: None,
            retry_count: 0,
            max_retries: new.max_retries.unwrap_or(3),
            is_recurring: new.is_recurring,
            recurrence_pattern: new.recurrence_pattern.map(|s| s.to_string()),
            recurrence_end_date: new.recurrence_end_date,
            parent_schedule_id: None,
            created_at: now,
            updated_at: now,
        };

        self.with_transaction(|tx| {
            let version = tx
                .get_version(new.content_version_id)?
                .ok_or_else(|| DbError::not_found("content version", new.content_version_id))?;

            tx.conn.execute(
                "INSERT INTO schedules (
                    id, content_version_id, organization_id, platform_connection_id,
                    scheduled_at, timezone, channel_meta, status, retry_count,
                    max_retries, is_recurring, recurrence_pattern, recurrence_end_date,
                    created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    schedule.id,
                    schedule.content_version_id,
                    schedule.organization_id,
                    schedule.platform_connection_id,
                    schedule.scheduled_at,
                    schedule.timezone,
                    schedule.channel_meta,
                    schedule.status,
                    schedule.max_retries,
                    schedule.is_recurring,
                    schedule.recurrence_pattern,
                    schedule.recurrence_end_date,
                    schedule.created_at,
                    schedule.updated_at,
                ],
            )?;

            tx.transition_request(&version.content_request_id, ContentStatus::Scheduled)?;
            Ok(())
        })?;

        Ok(schedule)
    }

    pub fn get_schedule(&self, id: &str) -> Result<Option<DbSchedule>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?1"),
                params![id],
                map_schedule,
            )
            .optional()?;
        Ok(row)
    }

    /// Schedules of an organization, newest first, optionally filtered by
    /// status, joined with their version / connection / published post.
    pub fn list_schedules(
        &self,
        organization_id: &str,
        status: Option<ScheduleStatus>,
        limit: usize,
    ) -> Result<Vec<ScheduleOverview>, DbError> {
        let schedules: Vec<DbSchedule> = match status {
            Some(status) => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {SCHEDULE_COLUMNS} FROM schedules
                     WHERE organization_id = ?1 AND status = ?2
                     ORDER BY created_at DESC LIMIT ?3"
                ))?;
                let rows =
                    stmt.query_map(params![organization_id, status, limit as i64], map_schedule)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {SCHEDULE_COLUMNS} FROM schedules
                     WHERE organization_id = ?1
                     ORDER BY created_at DESC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![organization_id, limit as i64], map_schedule)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        let mut out = Vec::with_capacity(schedules.len());
        for schedule in schedules {
            let content_version = self.get_version(&schedule.content_version_id)?;
            let platform_connection = match &schedule.platform_connection_id {
                Some(id) => self.get_connection(id)?,
                None => None,
            };
            let published_post = self.published_post_for_schedule(&schedule.id)?;
            out.push(ScheduleOverview {
                schedule,
                content_version,
                platform_connection,
                published_post,
            });
        }
        Ok(out)
    }

    /// PENDING schedules with a future timestamp, soonest first.
    pub fn upcoming_schedules(
        &self,
        organization_id: &str,
        limit: usize,
    ) -> Result<Vec<DbSchedule>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules
             WHERE organization_id = ?1 AND status = 'PENDING' AND scheduled_at >= ?2
             ORDER BY scheduled_at ASC LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            params![organization_id, now_ms(), limit as i64],
            map_schedule,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn recurring_schedules(
        &self,
        organization_id: &str,
    ) -> Result<Vec<DbSchedule>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules
             WHERE organization_id = ?1 AND is_recurring = 1
             ORDER BY scheduled_at ASC"
        ))?;
        let rows = stmt.query_map(params![organization_id], map_schedule)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Patch timing fields of a pending schedule. Status moves only through
    /// the explicit publish / fail / cancel operations.
    pub fn update_schedule(
        &self,
        id: &str,
        scheduled_at: Option<i64>,
        timezone: Option<&str>,
        channel_meta: Option<&str>,
    ) -> Result<(), DbError> {
        if let Some(tz) = timezone {
            if chrono_tz::Tz::from_str(tz).is_err() {
                return Err(DbError::InvalidTimezone(tz.to_string()));
            }
        }

        let updated = self.conn.execute(
            "UPDATE schedules SET
                scheduled_at = COALESCE(?1, scheduled_at),
                timezone = COALESCE(?2, timezone),
                channel_meta = COALESCE(?3, channel_meta),
                updated_at = ?4
             WHERE id = ?5",
            params![scheduled_at, timezone, channel_meta, now_ms(), id],
        )?;
        if updated == 0 {
            return Err(DbError::not_found("schedule", id));
        }
        Ok(())
    }

    /// Mark a schedule published: PENDING→PUBLISHED, exactly one
    /// published_posts row (UNIQUE on schedule_id), and the owning request
    /// SCHEDULED→PUBLISHED, all in one transaction.
    pub fn mark_schedule_published(
        &self,
        schedule_id: &str,
        platform_post_id: &str,
        platform_post_url: &str,
        platform_connection_id: &str,
    ) -> Result<DbPublishedPost, DbError> {
        self.with_transaction(|tx| {
            let schedule = tx
                .get_schedule(schedule_id)?
                .ok_or_else(|| DbError::not_found("schedule", schedule_id))?;

            tx.ensure_schedule_transition(&schedule, ScheduleStatus::Published)?;

            let now = now_ms();
            tx.conn.execute(
                "UPDATE schedules SET
                    status = ?1, published_at = ?2, published_post_id = ?3,
                    published_post_url = ?4, updated_at = ?2
                 WHERE id = ?5",
                params![
                    ScheduleStatus::Published,
                    now,
                    platform_post_id,
                    platform_post_url,
                    schedule_id
                ],
            )?;

            let post = DbPublishedPost {
                id: new_id(),
                schedule_id: schedule_id.to_string(),
                content_version_id: schedule.content_version_id.clone(),
                organization_id: schedule.organization_id.clone(),
                platform_connection_id: platform_connection_id.to_string(),
                platform_post_id: platform_post_id.to_string(),
                platform_post_url: platform_post_url.to_string(),
                published_at: now,
                metadata: None,
                created_at: now,
            };
            tx.conn.execute(
                "INSERT INTO published_posts (
                    id, schedule_id, content_version_id, organization_id,
                    platform_connection_id, platform_post_id, platform_post_url,
                    published_at, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    post.id,
                    post.schedule_id,
                    post.content_version_id,
                    post.organization_id,
                    post.platform_connection_id,
                    post.platform_post_id,
                    post.platform_post_url,
                    post.published_at,
                    post.created_at,
                ],
            )?;

            let version = tx
                .get_version(&schedule.content_version_id)?
                .ok_or_else(|| {
                    DbError::not_found("content version", &schedule.content_version_id)
                })?;
            tx.transition_request(&version.content_request_id, ContentStatus::Published)?;

            Ok(post)
        })
    }

    /// Record a failed publish attempt. While retries remain and the caller
    /// asked for one, the schedule stays PENDING with the counter advanced;
    /// otherwise it lands in FAILED.
    pub fn mark_schedule_failed(
        &self,
        schedule_id: &str,
        error_message: &str,
        should_retry: bool,
    ) -> Result<DbSchedule, DbError> {
        self.with_transaction(|tx| {
            let schedule = tx
                .get_schedule(schedule_id)?
                .ok_or_else(|| DbError::not_found("schedule", schedule_id))?;

            let retry_count = schedule.retry_count + 1;
            let next = if should_retry && retry_count < schedule.max_retries {
                ScheduleStatus::Pending
            } else {
                ScheduleStatus::Failed
            };
            tx.ensure_schedule_transition(&schedule, next)?;

            tx.conn.execute(
                "UPDATE schedules SET
                    status = ?1, error_message = ?2, retry_count = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![next, error_message, retry_count, now_ms(), schedule_id],
            )?;

            tx.get_schedule(schedule_id)?
                .ok_or_else(|| DbError::not_found("schedule", schedule_id))
        })
    }

    /// Cancel a pending schedule and hand the owning request back to
    /// APPROVED.
    pub fn cancel_schedule(&self, schedule_id: &str) -> Result<DbSchedule, DbError> {
        self.with_transaction(|tx| {
            let schedule = tx
                .get_schedule(schedule_id)?
                .ok_or_else(|| DbError::not_found("schedule", schedule_id))?;

            tx.ensure_schedule_transition(&schedule, ScheduleStatus::Cancelled)?;
            tx.conn.execute(
                "UPDATE schedules SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![ScheduleStatus::Cancelled, now_ms(), schedule_id],
            )?;

            let version = tx
                .get_version(&schedule.content_version_id)?
                .ok_or_else(|| {
                    DbError::not_found("content version", &schedule.content_version_id)
                })?;
            tx.transition_request(&version.content_request_id, ContentStatus::Approved)?;

            tx.get_schedule(schedule_id)?
                .ok_or_else(|| DbError::not_found("schedule", schedule_id))
        })
    }

    /// Validate a status move against the transition table; the caller
    /// writes the new status together with its audit fields.
    fn ensure_schedule_transition(
        &self,
        schedule: &DbSchedule,
        next: ScheduleStatus,
    ) -> Result<(), DbError> {
        if !schedule.status.can_transition_to(next) {
            return Err(DbError::IllegalTransition {
                entity: "schedule",
                from: schedule.status.to_string(),
                to: next.to_string(),
            });
        }
        Ok(())
    }

    // =========================================================================
    // Published posts
    // =========================================================================

    pub fn published_post_for_schedule(
        &self,
        schedule_id: &str,
    ) -> Result<Option<DbPublishedPost>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {PUBLISHED_COLUMNS} FROM published_posts WHERE schedule_id = ?1"),
                params![schedule_id],
                map_published,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_published_posts(
        &self,
        organization_id: &str,
    ) -> Result<Vec<DbPublishedPost>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PUBLISHED_COLUMNS} FROM published_posts
             WHERE organization_id = ?1 ORDER BY published_at DESC"
        ))?;
        let rows = stmt.query_map(params![organization_id], map_published)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewBrief;
    use crate::generation::fallback_variants;

    struct Fixture {
        org_id: String,
        user_id: String,
        request_id: String,
        version_id: String,
        connection_id: String,
    }

    fn seed(store: &Store) -> Fixture {
        let org = store
            .create_organization("Acme", "acme", None, None)
            .unwrap();
        let user = store
            .create_user("idp|1", "sam@acme.com", None, None, None, &org.id)
            .unwrap();
        let (_, requests) = store
            .create_brief(NewBrief {
                input_text: Some("Launch"),
                input_audio_path: None,
                language: None,
                organization_id: &org.id,
                user_id: &user.id,
                channels: &[Channel::Instagram],
                tone: None,
                variants_requested: None,
            })
            .unwrap();
        let request = &requests[0];
        let versions = store
            .insert_versions(&request.id, &user.id, "gpt-4o", &fallback_variants("Launch"))
            .unwrap();
        let connection = store
            .create_connection(NewConnection {
                organization_id: &org.id,
                platform: Channel::Instagram,
                account_id: "ig-123",
                account_name: "@acme",
                access_token: "token",
                refresh_token: None,
                token_expires_at: None,
                metadata: None,
                connected_by: &user.id,
            })
            .unwrap();
        store.approve_request(&request.id, &user.id).unwrap();

        Fixture {
            org_id: org.id,
            user_id: user.id,
            request_id: request.id.clone(),
            version_id: versions[0].id.clone(),
            connection_id: connection.id,
        }
    }

    fn pending_schedule(store: &Store, fx: &Fixture) -> DbSchedule {
        store
            .create_schedule(NewSchedule {
                content_version_id: &fx.version_id,
                organization_id: &fx.org_id,
                platform_connection_id: Some(&fx.connection_id),
                scheduled_at: now_ms() + 3_600_000,
                timezone: "America/New_York",
                channel_meta: None,
                is_recurring: false,
                recurrence_pattern: None,
                recurrence_end_date: None,
                max_retries: None,
            })
            .unwrap()
    }

    #[test]
    fn test_create_schedule_flips_request_to_scheduled() {
        let store = Store::open_in_memory().unwrap();
        let fx = seed(&store);
        let schedule = pending_schedule(&store, &fx);

        assert_eq!(schedule.status, ScheduleStatus::Pending);
        assert_eq!(schedule.max_retries, 3);
        let request = store.get_request(&fx.request_id).unwrap().unwrap();
        assert_eq!(request.status, ContentStatus::Scheduled);
    }

    #[test]
    fn test_invalid_timezone_rejected() {
        let store = Store::open_in_memory().unwrap();
        let fx = seed(&store);
        let err = store
            .create_schedule(NewSchedule {
                content_version_id: &fx.version_id,
                organization_id: &fx.org_id,
                platform_connection_id: None,
                scheduled_at: now_ms(),
                timezone: "Mars/Olympus_Mons",
                channel_meta: None,
                is_recurring: false,
                recurrence_pattern: None,
                recurrence_end_date: None,
                max_retries: None,
            })
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidTimezone(_)));
    }

    #[test]
    fn test_schedule_requires_approved_request() {
        let store = Store::open_in_memory().unwrap();
        let fx = seed(&store);
        // First schedule moves the request to SCHEDULED; a second schedule
        // for the same request is an illegal transition.
        pending_schedule(&store, &fx);
        let err = store
            .create_schedule(NewSchedule {
                content_version_id: &fx.version_id,
                organization_id: &fx.org_id,
                platform_connection_id: None,
                scheduled_at: now_ms(),
                timezone: "UTC",
                channel_meta: None,
                is_recurring: false,
                recurrence_pattern: None,
                recurrence_end_date: None,
                max_retries: None,
            })
            .unwrap_err();
        assert!(matches!(err, DbError::IllegalTransition { .. }));
    }

    #[test]
    fn test_publish_creates_exactly_one_post_and_flips_request() {
        let store = Store::open_in_memory().unwrap();
        let fx = seed(&store);
        let schedule = pending_schedule(&store, &fx);

        let post = store
            .mark_schedule_published(&schedule.id, "ext-9", "https://ig/p/9", &fx.connection_id)
            .unwrap();
        assert_eq!(post.platform_post_id, "ext-9");

        let published = store.get_schedule(&schedule.id).unwrap().unwrap();
        assert_eq!(published.status, ScheduleStatus::Published);
        assert!(published.published_at.is_some());

        let request = store.get_request(&fx.request_id).unwrap().unwrap();
        assert_eq!(request.status, ContentStatus::Published);

        // Publishing again is an illegal transition, and the UNIQUE index
        // would refuse a second post row regardless.
        assert!(matches!(
            store
                .mark_schedule_published(&schedule.id, "ext-9", "https://ig/p/9", &fx.connection_id)
                .unwrap_err(),
            DbError::IllegalTransition { .. }
        ));

        let count: i64 = store
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM published_posts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_fail_retries_until_exhausted() {
        let store = Store::open_in_memory().unwrap();
        let fx = seed(&store);
        let schedule = pending_schedule(&store, &fx);

        let s1 = store
            .mark_schedule_failed(&schedule.id, "rate limited", true)
            .unwrap();
        assert_eq!(s1.status, ScheduleStatus::Pending);
        assert_eq!(s1.retry_count, 1);

        let s2 = store
            .mark_schedule_failed(&schedule.id, "rate limited", true)
            .unwrap();
        assert_eq!(s2.status, ScheduleStatus::Pending);

        // Third attempt reaches max_retries (3): no retry budget left.
        let s3 = store
            .mark_schedule_failed(&schedule.id, "rate limited", true)
            .unwrap();
        assert_eq!(s3.status, ScheduleStatus::Failed);
        assert_eq!(s3.retry_count, 3);
        assert_eq!(s3.error_message.as_deref(), Some("rate limited"));

        // Terminal: no further attempts.
        assert!(matches!(
            store
                .mark_schedule_failed(&schedule.id, "again", true)
                .unwrap_err(),
            DbError::IllegalTransition { .. }
        ));
    }

    #[test]
    fn test_cancel_returns_request_to_approved() {
        let store = Store::open_in_memory().unwrap();
        let fx = seed(&store);
        let schedule = pending_schedule(&store, &fx);

        let cancelled = store.cancel_schedule(&schedule.id).unwrap();
        assert_eq!(cancelled.status, ScheduleStatus::Cancelled);

        let request = store.get_request(&fx.request_id).unwrap().unwrap();
        assert_eq!(request.status, ContentStatus::Approved);
        let _ = fx.user_id;
    }
}
