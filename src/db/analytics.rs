use rusqlite::params;

use super::{DbAnalyticsAggregate, DbEngagementEvent, DbError, Store};
use crate::util::{new_id, now_ms};

fn map_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbEngagementEvent> {
    Ok(DbEngagementEvent {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        content_version_id: row.get(2)?,
        published_post_id: row.get(3)?,
        event_type: row.get(4)?,
        value: row.get(5)?,
        raw_payload: row.get(6)?,
        timestamp: row.get(7)?,
    })
}

const EVENT_COLUMNS: &str = "id, organization_id, content_version_id, published_post_id, \
     event_type, value, raw_payload, timestamp";

fn map_aggregate(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbAnalyticsAggregate> {
    Ok(DbAnalyticsAggregate {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        period: row.get(2)?,
        period_start: row.get(3)?,
        period_end: row.get(4)?,
        impressions: row.get(5)?,
        engagement: row.get(6)?,
        clicks: row.get(7)?,
        shares: row.get(8)?,
        saves: row.get(9)?,
        created_at: row.get(10)?,
    })
}

const AGGREGATE_COLUMNS: &str = "id, organization_id, period, period_start, period_end, \
     impressions, engagement, clicks, shares, saves, created_at";

/// Creation parameters for a raw engagement event.
pub struct NewEngagementEvent<'a> {
    pub organization_id: &'a str,
    pub content_version_id: Option<&'a str>,
    pub published_post_id: Option<&'a str>,
    /// like, comment, impression, click, share, save
    pub event_type: &'a str,
    pub value: Option<i64>,
    /// Raw platform payload, serialized JSON.
    pub raw_payload: Option<&'a str>,
}

/// Optional filters for the event query.
#[derive(Default)]
pub struct EventFilter<'a> {
    pub content_version_id: Option<&'a str>,
    pub published_post_id: Option<&'a str>,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

/// Additive counter deltas for an aggregate upsert.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateDeltas {
    pub impressions: i64,
    pub engagement: i64,
    pub clicks: i64,
    pub shares: i64,
    pub saves: i64,
}

impl Store {
    /// Append one raw telemetry event, stamped now.
    pub fn record_engagement_event(
        &self,
        new: NewEngagementEvent<'_>,
    ) -> Result<DbEngagementEvent, DbError> {
        let event = DbEngagementEvent {
            id: new_id(),
            organization_id: new.organization_id.to_string(),
            content_version_id: new.content_version_id.map(|s| s.to_string()),
            published_post_id: new.published_post_id.map(|s| s.to_string()),
            event_type: new.event_type.to_string(),
            value: new.value,
            raw_payload: new.raw_payload.map(|s| s.to_string()),
            timestamp: now_ms(),
        };

        self.conn.execute(
            "INSERT INTO engagement_events (
                id, organization_id, content_version_id, published_post_id,
                event_type, value, raw_payload, timestamp
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.id,
                event.organization_id,
                event.content_version_id,
                event.published_post_id,
                event.event_type,
                event.value,
                event.raw_payload,
                event.timestamp,
            ],
        )?;

        Ok(event)
    }

    /// Events for an organization, newest first, with optional version /
    /// post / time-range filters.
    pub fn list_engagement_events(
        &self,
        organization_id: &str,
        filter: EventFilter<'_>,
    ) -> Result<Vec<DbEngagementEvent>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM engagement_events
             WHERE organization_id = ?1
               AND (?2 IS NULL OR content_version_id = ?2)
               AND (?3 IS NULL OR published_post_id = ?3)
               AND (?4 IS NULL OR timestamp >= ?4)
               AND (?5 IS NULL OR timestamp <= ?5)
             ORDER BY timestamp DESC"
        ))?;
        let rows = stmt.query_map(
            params![
                organization_id,
                filter.content_version_id,
                filter.published_post_id,
                filter.start,
                filter.end,
            ],
            map_event,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Additive upsert of a period bucket, keyed (organization, period,
    /// period_start). Counters sum; they are never recomputed from raw
    /// events.
    pub fn upsert_aggregate(
        &self,
        organization_id: &str,
        period: &str,
        period_start: i64,
        period_end: i64,
        deltas: AggregateDeltas,
    ) -> Result<DbAnalyticsAggregate, DbError> {
        self.with_transaction(|tx| {
            tx.conn.execute(
                "INSERT INTO analytics_aggregates (
                    id, organization_id, period, period_start, period_end,
                    impressions, engagement, clicks, shares, saves, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(organization_id, period, period_start) DO UPDATE SET
                    impressions = impressions + excluded.impressions,
                    engagement = engagement + excluded.engagement,
                    clicks = clicks + excluded.clicks,
                    shares = shares + excluded.shares,
                    saves = saves + excluded.saves",
                params![
                    new_id(),
                    organization_id,
                    period,
                    period_start,
                    period_end,
                    deltas.impressions,
                    deltas.engagement,
                    deltas.clicks,
                    deltas.shares,
                    deltas.saves,
                    now_ms(),
                ],
            )?;

            tx.conn
                .query_row(
                    &format!(
                        "SELECT {AGGREGATE_COLUMNS} FROM analytics_aggregates
                         WHERE organization_id = ?1 AND period = ?2 AND period_start = ?3"
                    ),
                    params![organization_id, period, period_start],
                    map_aggregate,
                )
                .map_err(DbError::from)
        })
    }

    /// Aggregates for an organization, newest first, with optional period /
    /// range filters.
    pub fn list_aggregates(
        &self,
        organization_id: &str,
        period: Option<&str>,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<DbAnalyticsAggregate>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {AGGREGATE_COLUMNS} FROM analytics_aggregates
             WHERE organization_id = ?1
               AND (?2 IS NULL OR period = ?2)
               AND (?3 IS NULL OR period_start >= ?3)
               AND (?4 IS NULL OR period_end <= ?4)
             ORDER BY period_start DESC"
        ))?;
        let rows = stmt.query_map(params![organization_id, period, start, end], map_aggregate)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org(store: &Store) -> String {
        store
            .create_organization("Acme", "acme", None, None)
            .unwrap()
            .id
    }

    #[test]
    fn test_aggregate_upsert_is_additive() {
        let store = Store::open_in_memory().unwrap();
        let org_id = org(&store);

        let first = store
            .upsert_aggregate(
                &org_id,
                "daily",
                1_000,
                2_000,
                AggregateDeltas {
                    impressions: 100,
                    clicks: 5,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(first.impressions, 100);

        let second = store
            .upsert_aggregate(
                &org_id,
                "daily",
                1_000,
                2_000,
                AggregateDeltas {
                    impressions: 50,
                    engagement: 7,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.impressions, 150);
        assert_eq!(second.engagement, 7);
        assert_eq!(second.clicks, 5);

        // A different period key gets its own row.
        let weekly = store
            .upsert_aggregate(&org_id, "weekly", 1_000, 8_000, AggregateDeltas::default())
            .unwrap();
        assert_ne!(weekly.id, first.id);
    }

    #[test]
    fn test_event_filters() {
        let store = Store::open_in_memory().unwrap();
        let org_id = org(&store);

        store
            .record_engagement_event(NewEngagementEvent {
                organization_id: &org_id,
                content_version_id: None,
                published_post_id: None,
                event_type: "impression",
                value: Some(1),
                raw_payload: None,
            })
            .unwrap();
        store
            .record_engagement_event(NewEngagementEvent {
                organization_id: &org_id,
                content_version_id: None,
                published_post_id: None,
                event_type: "like",
                value: None,
                raw_payload: Some(r#"{"source":"webhook"}"#),
            })
            .unwrap();

        let all = store
            .list_engagement_events(&org_id, EventFilter::default())
            .unwrap();
        assert_eq!(all.len(), 2);

        let future_only = store
            .list_engagement_events(
                &org_id,
                EventFilter {
                    start: Some(now_ms() + 60_000),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(future_only.is_empty());
    }
}
