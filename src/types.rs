//! Domain enums and shared value types.
//!
//! Enum values are stored as TEXT columns; the `sql_text_enum!` macro wires
//! up the string mapping once per enum so the store layer can read and write
//! them without per-call-site parsing. Serde names match the wire casing the
//! API uses (upper-case for workflow enums, lower-case for storage states).

use serde::{Deserialize, Serialize};

macro_rules! sql_text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = String;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!(concat!("unknown ", stringify!($ty), ": {}"), other)),
                }
            }
        }

        impl rusqlite::types::ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(self.as_str().into())
            }
        }

        impl rusqlite::types::FromSql for $ty {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| rusqlite::types::FromSqlError::Other(e.into()))
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Subscription & membership
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Plan {
    Starter,
    Pro,
    Agency,
    Enterprise,
}

sql_text_enum!(Plan {
    Starter => "STARTER",
    Pro => "PRO",
    Agency => "AGENCY",
    Enterprise => "ENTERPRISE",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Editor,
    Reviewer,
}

sql_text_enum!(Role {
    Admin => "ADMIN",
    Editor => "EDITOR",
    Reviewer => "REVIEWER",
});

/// Per-plan soft limits, surfaced for display only. No operation rejects an
/// action for exceeding a limit; `-1` means unlimited.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    pub generations: i64,
    pub scheduled_posts: i64,
    pub users: i64,
    pub knowledge_files: i64,
}

impl PlanLimits {
    pub fn for_plan(plan: Plan) -> Self {
        match plan {
            Plan::Starter => Self {
                generations: 10,
                scheduled_posts: 2,
                users: 1,
                knowledge_files: 0,
            },
            Plan::Pro => Self {
                generations: 500,
                scheduled_posts: 50,
                users: 3,
                knowledge_files: 10,
            },
            Plan::Agency => Self {
                generations: 5000,
                scheduled_posts: -1,
                users: 10,
                knowledge_files: 100,
            },
            Plan::Enterprise => Self {
                generations: -1,
                scheduled_posts: -1,
                users: -1,
                knowledge_files: -1,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Channels & content workflow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Instagram,
    Facebook,
    Twitter,
    Linkedin,
    Blog,
    Email,
    Whatsapp,
}

sql_text_enum!(Channel {
    Instagram => "INSTAGRAM",
    Facebook => "FACEBOOK",
    Twitter => "TWITTER",
    Linkedin => "LINKEDIN",
    Blog => "BLOG",
    Email => "EMAIL",
    Whatsapp => "WHATSAPP",
});

impl Channel {
    pub const ALL: [Channel; 7] = [
        Channel::Instagram,
        Channel::Facebook,
        Channel::Twitter,
        Channel::Linkedin,
        Channel::Blog,
        Channel::Email,
        Channel::Whatsapp,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentStatus {
    Drafted,
    Approved,
    Scheduled,
    Published,
    Rejected,
}

sql_text_enum!(ContentStatus {
    Drafted => "DRAFTED",
    Approved => "APPROVED",
    Scheduled => "SCHEDULED",
    Published => "PUBLISHED",
    Rejected => "REJECTED",
});

impl ContentStatus {
    /// Legal workflow moves. Publishing a rejected request, re-approving a
    /// published one, and similar shortcuts are rejected by the store.
    pub fn can_transition_to(self, next: ContentStatus) -> bool {
        use ContentStatus::*;
        matches!(
            (self, next),
            (Drafted, Approved)
                | (Drafted, Rejected)
                | (Approved, Scheduled)
                | (Approved, Rejected)
                | (Scheduled, Published)
                | (Scheduled, Approved) // schedule cancelled
                | (Rejected, Drafted) // regeneration reopens the request
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    Pending,
    Published,
    Failed,
    Cancelled,
}

sql_text_enum!(ScheduleStatus {
    Pending => "PENDING",
    Published => "PUBLISHED",
    Failed => "FAILED",
    Cancelled => "CANCELLED",
});

impl ScheduleStatus {
    /// `Pending → Pending` covers a failed attempt that still has retries
    /// left (the counter advances, the status does not).
    pub fn can_transition_to(self, next: ScheduleStatus) -> bool {
        use ScheduleStatus::*;
        matches!(
            (self, next),
            (Pending, Pending) | (Pending, Published) | (Pending, Failed) | (Pending, Cancelled)
        )
    }
}

// ---------------------------------------------------------------------------
// Files & storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

sql_text_enum!(ProcessingStatus {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
});

impl ProcessingStatus {
    /// `Failed → Processing` allows a re-ingest of a file whose first pass
    /// died during extraction.
    pub fn can_transition_to(self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Processing)
        )
    }
}

/// Where a stored object physically lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Platform-managed blob storage.
    Platform,
    S3,
    /// Caller-supplied external URL.
    External,
    /// AI-generated asset (media attachments only).
    Generated,
}

sql_text_enum!(StorageKind {
    Platform => "platform",
    S3 => "s3",
    External => "external",
    Generated => "generated",
});

// ---------------------------------------------------------------------------
// Usage accounting
// ---------------------------------------------------------------------------

/// Billable actions metered per organization per rolling 30-day period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageKind {
    Generation,
    ScheduledPost,
    FileUpload,
}

impl UsageKind {
    /// Counter column the action increments.
    pub(crate) fn column(self) -> &'static str {
        match self {
            UsageKind::Generation => "generations_count",
            UsageKind::ScheduledPost => "scheduled_posts_count",
            UsageKind::FileUpload => "files_uploaded_count",
        }
    }
}

// ---------------------------------------------------------------------------
// Typed platform metadata
// ---------------------------------------------------------------------------

/// Platform-specific posting options attached to a schedule or media item.
///
/// One variant per known producer; payloads from platforms this build does
/// not model land in `Other` without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "platform",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ChannelMeta {
    Instagram {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        first_comment: Option<String>,
        #[serde(default)]
        share_to_story: bool,
    },
    Twitter {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply_settings: Option<String>,
    },
    Linkedin {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        visibility: Option<String>,
    },
    Email {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject_line: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preheader: Option<String>,
    },
    #[serde(untagged)]
    Other(serde_json::Value),
}

/// Connection-level settings captured when an external account is linked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "platform",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ConnectionMeta {
    Instagram {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        business_account_id: Option<String>,
    },
    Facebook {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page_id: Option<String>,
    },
    Linkedin {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        organization_urn: Option<String>,
    },
    #[serde(untagged)]
    Other(serde_json::Value),
}

// ---------------------------------------------------------------------------
// Generation output
// ---------------------------------------------------------------------------

/// One generated copy variant, as returned by the provider (or the fallback
/// template) and as persisted into a content version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentVariant {
    pub text: String,
    pub suggested_hashtags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_image_prompt: Option<String>,
    /// Chunk identifiers the variant drew on, when retrieval was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_text_roundtrip() {
        for channel in Channel::ALL {
            assert_eq!(channel.as_str().parse::<Channel>().unwrap(), channel);
        }
        assert_eq!("STARTER".parse::<Plan>().unwrap(), Plan::Starter);
        assert_eq!("pending".parse::<ProcessingStatus>().unwrap(), ProcessingStatus::Pending);
        assert!("instagram".parse::<Channel>().is_err());
    }

    #[test]
    fn test_content_transitions() {
        use ContentStatus::*;
        assert!(Drafted.can_transition_to(Approved));
        assert!(Approved.can_transition_to(Scheduled));
        assert!(Scheduled.can_transition_to(Published));
        assert!(Rejected.can_transition_to(Drafted));
        // Illegal shortcuts
        assert!(!Rejected.can_transition_to(Published));
        assert!(!Drafted.can_transition_to(Published));
        assert!(!Published.can_transition_to(Drafted));
        assert!(!Drafted.can_transition_to(Scheduled));
    }

    #[test]
    fn test_schedule_transitions() {
        use ScheduleStatus::*;
        assert!(Pending.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Published));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Published.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Published));
    }

    #[test]
    fn test_processing_transitions() {
        use ProcessingStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Failed.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Processing));
    }

    #[test]
    fn test_channel_meta_tagged_and_catch_all() {
        let meta: ChannelMeta = serde_json::from_str(
            r#"{"platform":"INSTAGRAM","firstComment":"link in bio","shareToStory":true}"#,
        )
        .unwrap();
        assert_eq!(
            meta,
            ChannelMeta::Instagram {
                first_comment: Some("link in bio".to_string()),
                share_to_story: true,
            }
        );

        let other: ChannelMeta =
            serde_json::from_str(r#"{"platform":"TIKTOK","duet":false}"#).unwrap();
        assert!(matches!(other, ChannelMeta::Other(_)));
    }
}
