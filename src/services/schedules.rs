//! Schedule lifecycle: creation (with usage accounting), publish, fail,
//! cancel.
//!
//! "Scheduling" only writes a future timestamp and a PENDING status;
//! nothing in this process polls or publishes. The publish / fail
//! operations record the outcome an external publisher reports.

use serde::Deserialize;

use super::ServiceError;
use crate::db::{DbPublishedPost, DbSchedule, NewSchedule, ScheduleOverview};
use crate::state::AppState;
use crate::types::{ChannelMeta, ScheduleStatus, UsageKind};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduleInput {
    pub content_version_id: String,
    pub organization_id: String,
    pub platform_connection_id: Option<String>,
    /// Epoch milliseconds.
    pub scheduled_at: i64,
    /// IANA timezone name, e.g. "America/New_York".
    pub timezone: String,
    pub channel_meta: Option<ChannelMeta>,
    #[serde(default)]
    pub is_recurring: bool,
    pub recurrence_pattern: Option<String>,
    pub recurrence_end_date: Option<i64>,
    pub max_retries: Option<i64>,
}

/// Create a PENDING schedule and count it against the usage period.
pub fn create_schedule(
    state: &AppState,
    input: &CreateScheduleInput,
) -> Result<DbSchedule, ServiceError> {
    let channel_meta = input
        .channel_meta
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| ServiceError::validation(format!("invalid channelMeta: {e}")))?;

    let store = state.store.lock();
    let schedule = store.create_schedule(NewSchedule {
        content_version_id: &input.content_version_id,
        organization_id: &input.organization_id,
        platform_connection_id: input.platform_connection_id.as_deref(),
        scheduled_at: input.scheduled_at,
        timezone: &input.timezone,
        channel_meta: channel_meta.as_deref(),
        is_recurring: input.is_recurring,
        recurrence_pattern: input.recurrence_pattern.as_deref(),
        recurrence_end_date: input.recurrence_end_date,
        max_retries: input.max_retries,
    })?;
    store.record_usage(&input.organization_id, UsageKind::ScheduledPost)?;

    Ok(schedule)
}

pub fn list_schedules(
    state: &AppState,
    organization_id: &str,
    status: Option<ScheduleStatus>,
    limit: usize,
) -> Result<Vec<ScheduleOverview>, ServiceError> {
    Ok(state
        .store
        .lock()
        .list_schedules(organization_id, status, limit)?)
}

pub fn upcoming(
    state: &AppState,
    organization_id: &str,
    limit: usize,
) -> Result<Vec<DbSchedule>, ServiceError> {
    Ok(state.store.lock().upcoming_schedules(organization_id, limit)?)
}

/// Record a successful external publish: schedule → PUBLISHED, one
/// published-post row, owning request → PUBLISHED.
pub fn mark_published(
    state: &AppState,
    schedule_id: &str,
    platform_post_id: &str,
    platform_post_url: &str,
    platform_connection_id: &str,
) -> Result<DbPublishedPost, ServiceError> {
    Ok(state.store.lock().mark_schedule_published(
        schedule_id,
        platform_post_id,
        platform_post_url,
        platform_connection_id,
    )?)
}

/// Record a failed publish attempt; retries keep the schedule PENDING until
/// the budget is spent.
pub fn mark_failed(
    state: &AppState,
    schedule_id: &str,
    error_message: &str,
    should_retry: bool,
) -> Result<DbSchedule, ServiceError> {
    Ok(state
        .store
        .lock()
        .mark_schedule_failed(schedule_id, error_message, should_retry)?)
}

pub fn cancel(state: &AppState, schedule_id: &str) -> Result<DbSchedule, ServiceError> {
    Ok(state.store.lock().cancel_schedule(schedule_id)?)
}
