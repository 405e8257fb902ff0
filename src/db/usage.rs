use rusqlite::{params, OptionalExtension};

use super::{DbError, DbUsagePeriod, Store};
use crate::types::UsageKind;
use crate::util::{new_id, now_ms};

/// Rolling usage window: 30 days.
pub const USAGE_PERIOD_MS: i64 = 30 * 24 * 60 * 60 * 1000;

fn map_period(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbUsagePeriod> {
    Ok(DbUsagePeriod {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        period_start: row.get(2)?,
        period_end: row.get(3)?,
        generations_count: row.get(4)?,
        scheduled_posts_count: row.get(5)?,
        files_uploaded_count: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

const PERIOD_COLUMNS: &str = "id, organization_id, period_start, period_end, \
     generations_count, scheduled_posts_count, files_uploaded_count, \
     created_at, updated_at";

impl Store {
    /// Count one billable action against the period containing `now`,
    /// creating a zeroed 30-day period when none covers the instant.
    ///
    /// The lookup, the optional insert, and the `x = x + 1` increment run in
    /// one transaction, so concurrent callers cannot lose updates; the
    /// UNIQUE (organization, period_start) index absorbs a duplicate create.
    /// Soft metering only: nothing here rejects an over-limit action.
    pub fn record_usage(&self, organization_id: &str, kind: UsageKind) -> Result<DbUsagePeriod, DbError> {
        self.record_usage_at(organization_id, kind, now_ms())
    }

    pub(crate) fn record_usage_at(
        &self,
        organization_id: &str,
        kind: UsageKind,
        now: i64,
    ) -> Result<DbUsagePeriod, DbError> {
        self.with_transaction(|tx| {
            let period = match tx.current_usage_period(organization_id, now)? {
                Some(p) => p,
                None => tx.insert_usage_period(organization_id, now)?,
            };

            tx.conn.execute(
                &format!(
                    "UPDATE usage_tracking SET {col} = {col} + 1, updated_at = ?1 WHERE id = ?2",
                    col = kind.column()
                ),
                params![now, period.id],
            )?;

            tx.get_usage_period(&period.id)?
                .ok_or_else(|| DbError::not_found("usage period", &period.id))
        })
    }

    /// The period whose [start, end] window contains `now`, if any.
    pub fn current_usage_period(
        &self,
        organization_id: &str,
        now: i64,
    ) -> Result<Option<DbUsagePeriod>, DbError> {
        let period = self
            .conn
            .query_row(
                &format!(
                    "SELECT {PERIOD_COLUMNS} FROM usage_tracking
                     WHERE organization_id = ?1 AND period_start <= ?2 AND period_end >= ?2
                     ORDER BY period_start DESC
                     LIMIT 1"
                ),
                params![organization_id, now],
                map_period,
            )
            .optional()?;
        Ok(period)
    }

    /// All periods for an organization, most recent first. Prior periods are
    /// never rewritten; a fresh window starts its counters at zero.
    pub fn list_usage_periods(&self, organization_id: &str) -> Result<Vec<DbUsagePeriod>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PERIOD_COLUMNS} FROM usage_tracking
             WHERE organization_id = ?1
             ORDER BY period_start DESC"
        ))?;
        let rows = stmt.query_map(params![organization_id], map_period)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn get_usage_period(&self, id: &str) -> Result<Option<DbUsagePeriod>, DbError> {
        let period = self
            .conn
            .query_row(
                &format!("SELECT {PERIOD_COLUMNS} FROM usage_tracking WHERE id = ?1"),
                params![id],
                map_period,
            )
            .optional()?;
        Ok(period)
    }

    /// Insert a zero-counter period opening at `now`.
    pub(crate) fn insert_usage_period(
        &self,
        organization_id: &str,
        now: i64,
    ) -> Result<DbUsagePeriod, DbError> {
        let period = DbUsagePeriod {
            id: new_id(),
            organization_id: organization_id.to_string(),
            period_start: now,
            period_end: now + USAGE_PERIOD_MS,
            generations_count: 0,
            scheduled_posts_count: 0,
            files_uploaded_count: 0,
            created_at: now,
            updated_at: now,
        };

        self.conn.execute(
            "INSERT INTO usage_tracking (
                id, organization_id, period_start, period_end,
                generations_count, scheduled_posts_count, files_uploaded_count,
                created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, 0, 0, 0, ?5, ?6)",
            params![
                period.id,
                period.organization_id,
                period.period_start,
                period.period_end,
                period.created_at,
                period.updated_at,
            ],
        )?;

        Ok(period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Plan;

    fn org(store: &Store) -> String {
        store
            .create_organization("Acme", "acme", Some(Plan::Pro), None)
            .unwrap()
            .id
    }

    #[test]
    fn test_increment_within_period() {
        let store = Store::open_in_memory().unwrap();
        let org_id = org(&store);
        let t0 = now_ms();

        let p1 = store
            .record_usage_at(&org_id, UsageKind::Generation, t0)
            .unwrap();
        assert_eq!(p1.generations_count, 1);

        let p2 = store
            .record_usage_at(&org_id, UsageKind::Generation, t0 + 1000)
            .unwrap();
        assert_eq!(p2.id, p1.id);
        assert_eq!(p2.generations_count, 2);
        assert_eq!(p2.scheduled_posts_count, 0);

        let p3 = store
            .record_usage_at(&org_id, UsageKind::FileUpload, t0 + 2000)
            .unwrap();
        assert_eq!(p3.files_uploaded_count, 1);
        assert_eq!(p3.generations_count, 2);
    }

    #[test]
    fn test_new_period_starts_at_zero_and_preserves_old() {
        let store = Store::open_in_memory().unwrap();
        let org_id = org(&store);
        let t0 = now_ms();

        let first = store
            .record_usage_at(&org_id, UsageKind::Generation, t0)
            .unwrap();
        assert_eq!(first.generations_count, 1);

        // Past the end of the seeded window: a fresh period is created.
        let later = first.period_end + 1;
        let second = store
            .record_usage_at(&org_id, UsageKind::Generation, later)
            .unwrap();
        assert_ne!(second.id, first.id);
        assert_eq!(second.generations_count, 1);
        assert_eq!(second.period_start, later);

        // Prior period row unchanged.
        let all = store.list_usage_periods(&org_id).unwrap();
        let old = all.iter().find(|p| p.id == first.id).unwrap();
        assert_eq!(old.generations_count, 1);
        assert_eq!(old.period_end, first.period_end);
    }

    #[test]
    fn test_counters_monotonic_non_negative() {
        let store = Store::open_in_memory().unwrap();
        let org_id = org(&store);
        let t0 = now_ms();

        let mut last = 0;
        for i in 0..5 {
            let p = store
                .record_usage_at(&org_id, UsageKind::ScheduledPost, t0 + i)
                .unwrap();
            assert!(p.scheduled_posts_count > last - 1);
            assert!(p.scheduled_posts_count >= 0);
            last = p.scheduled_posts_count;
        }
        assert_eq!(last, 5);
    }
}
