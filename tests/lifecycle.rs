//! End-to-end lifecycle scenarios exercised through the service layer with
//! an in-memory store and the deterministic stub provider.

use std::sync::Arc;

use copydesk::config::Config;
use copydesk::db::Store;
use copydesk::generation::provider::StubProvider;
use copydesk::services::briefs::{self, CreateBriefInput};
use copydesk::services::content::{self, GenerateContentInput};
use copydesk::services::schedules::{self, CreateScheduleInput};
use copydesk::services::uploads::{self, UploadInput};
use copydesk::state::{AppState, SharedState};
use copydesk::types::{Channel, ContentStatus, Plan, ScheduleStatus};
use copydesk::util::now_ms;

fn test_state() -> SharedState {
    let store = Store::open_in_memory().expect("in-memory store");
    AppState::new(store, Arc::new(StubProvider::new()), Config::default())
}

struct Tenant {
    org_id: String,
    user_id: String,
}

fn onboard_acme(state: &AppState) -> Tenant {
    let store = state.store.lock();
    let org = store
        .create_organization("Acme", "acme", Some(Plan::Pro), None)
        .unwrap();
    let user = store
        .create_user("idp|acme-1", "sam@acme.com", Some("Sam"), None, None, &org.id)
        .unwrap();
    Tenant {
        org_id: org.id,
        user_id: user.id,
    }
}

#[tokio::test]
async fn brief_creation_fans_out_drafted_requests() {
    let state = test_state();
    let tenant = onboard_acme(&state);

    let created = briefs::create_brief(
        &state,
        &CreateBriefInput {
            input_text: Some("Announce our spring collection to the world".to_string()),
            input_audio_path: None,
            language: None,
            organization_id: tenant.org_id.clone(),
            user_id: tenant.user_id.clone(),
            channels: vec![Channel::Instagram, Channel::Blog],
            tone: None,
            variants_requested: None,
        },
    )
    .unwrap();

    assert_eq!(created.content_request_ids.len(), 2);

    let detail = briefs::brief_detail(&state, &created.brief_id).unwrap();
    assert_eq!(detail.content_requests.len(), 2);
    for request in &detail.content_requests {
        assert_eq!(request.status, ContentStatus::Drafted);
    }
    let channels: Vec<Channel> = detail.content_requests.iter().map(|r| r.channel).collect();
    assert!(channels.contains(&Channel::Instagram));
    assert!(channels.contains(&Channel::Blog));
}

#[tokio::test]
async fn full_publish_lifecycle() {
    let state = test_state();
    let tenant = onboard_acme(&state);

    // Brief → generate → approve → schedule → publish.
    let created = briefs::create_brief(
        &state,
        &CreateBriefInput {
            input_text: Some("Beta launch next Tuesday".to_string()),
            input_audio_path: None,
            language: None,
            organization_id: tenant.org_id.clone(),
            user_id: tenant.user_id.clone(),
            channels: vec![Channel::Linkedin],
            tone: Some("confident".to_string()),
            variants_requested: None,
        },
    )
    .unwrap();

    let generated = content::generate_content(
        &state,
        &GenerateContentInput {
            brief_id: created.brief_id.clone(),
            channel: Channel::Linkedin,
            tone: None,
            use_rag: false,
            user_id: tenant.user_id.clone(),
        },
    )
    .await
    .unwrap();

    assert_eq!(generated.variants.len(), 3);
    let selected: Vec<_> = generated.variants.iter().filter(|v| v.is_selected).collect();
    assert_eq!(selected.len(), 1);

    // Pick the second variant instead, then approve.
    content::select_version(&state, &generated.variants[1].id).unwrap();
    content::approve(&state, &generated.content_request_id, &tenant.user_id).unwrap();

    let connection_id = {
        let store = state.store.lock();
        store
            .create_connection(copydesk::db::NewConnection {
                organization_id: &tenant.org_id,
                platform: Channel::Linkedin,
                account_id: "li-77",
                account_name: "Acme Inc",
                access_token: "secret",
                refresh_token: None,
                token_expires_at: None,
                metadata: None,
                connected_by: &tenant.user_id,
            })
            .unwrap()
            .id
    };

    let schedule = schedules::create_schedule(
        &state,
        &CreateScheduleInput {
            content_version_id: generated.variants[1].id.clone(),
            organization_id: tenant.org_id.clone(),
            platform_connection_id: Some(connection_id.clone()),
            scheduled_at: now_ms() + 3_600_000,
            timezone: "America/New_York".to_string(),
            channel_meta: None,
            is_recurring: false,
            recurrence_pattern: None,
            recurrence_end_date: None,
            max_retries: None,
        },
    )
    .unwrap();

    let post = schedules::mark_published(
        &state,
        &schedule.id,
        "urn:li:share:123",
        "https://linkedin.com/posts/123",
        &connection_id,
    )
    .unwrap();
    assert_eq!(post.schedule_id, schedule.id);

    // The request reaches PUBLISHED and exactly one published post exists.
    let store = state.store.lock();
    let request = store
        .get_request(&generated.content_request_id)
        .unwrap()
        .unwrap();
    assert_eq!(request.status, ContentStatus::Published);

    let posts = store.list_published_posts(&tenant.org_id).unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].platform_post_id, "urn:li:share:123");

    let published_schedule = store.get_schedule(&schedule.id).unwrap().unwrap();
    assert_eq!(published_schedule.status, ScheduleStatus::Published);

    // Usage: one generation, one scheduled post.
    let usage = store
        .current_usage_period(&tenant.org_id, now_ms())
        .unwrap()
        .unwrap();
    assert_eq!(usage.generations_count, 1);
    assert_eq!(usage.scheduled_posts_count, 1);
}

#[tokio::test]
async fn illegal_transitions_are_rejected_end_to_end() {
    let state = test_state();
    let tenant = onboard_acme(&state);

    let created = briefs::create_brief(
        &state,
        &CreateBriefInput {
            input_text: Some("Reject me".to_string()),
            input_audio_path: None,
            language: None,
            organization_id: tenant.org_id.clone(),
            user_id: tenant.user_id.clone(),
            channels: vec![Channel::Twitter],
            tone: None,
            variants_requested: None,
        },
    )
    .unwrap();
    let request_id = created.content_request_ids[0].clone();

    content::reject(&state, &request_id, &tenant.user_id, Some("not now")).unwrap();

    // A rejected request cannot be approved or scheduled.
    assert!(content::approve(&state, &request_id, &tenant.user_id).is_err());

    // Regeneration reopens the request, after which approval works.
    content::generate_content(
        &state,
        &GenerateContentInput {
            brief_id: created.brief_id,
            channel: Channel::Twitter,
            tone: None,
            use_rag: false,
            user_id: tenant.user_id.clone(),
        },
    )
    .await
    .unwrap();
    let approved = content::approve(&state, &request_id, &tenant.user_id).unwrap();
    assert_eq!(approved.status, ContentStatus::Approved);
}

#[tokio::test]
async fn upload_ingest_and_cascade_delete() {
    let state = test_state();
    let tenant = onboard_acme(&state);

    let body = "Organizational knowledge worth retrieving. ".repeat(30);
    let uploaded = uploads::upload_file(
        &state,
        UploadInput {
            filename: "handbook.txt",
            file_type: "text/plain",
            bytes: body.as_bytes(),
            language: Some("en"),
            organization_id: &tenant.org_id,
            user_id: &tenant.user_id,
        },
    )
    .await
    .unwrap();

    let report = uploaded.ingest.expect("ingestion ran");
    assert!(report.chunks_total >= 3);
    assert_eq!(report.chunks_embedded, report.chunks_total);

    {
        let store = state.store.lock();
        let usage = store
            .current_usage_period(&tenant.org_id, now_ms())
            .unwrap()
            .unwrap();
        assert_eq!(usage.files_uploaded_count, 1);

        store.delete_file(&uploaded.file_id).unwrap();
        let orphans: i64 = store
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM knowledge_chunks", [], |r| r.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }
}

#[tokio::test]
async fn brief_delete_leaves_no_orphans() {
    let state = test_state();
    let tenant = onboard_acme(&state);

    let created = briefs::create_brief(
        &state,
        &CreateBriefInput {
            input_text: Some("Ephemeral campaign".to_string()),
            input_audio_path: None,
            language: None,
            organization_id: tenant.org_id.clone(),
            user_id: tenant.user_id.clone(),
            channels: vec![Channel::Email, Channel::Whatsapp],
            tone: None,
            variants_requested: None,
        },
    )
    .unwrap();

    let generated = content::generate_content(
        &state,
        &GenerateContentInput {
            brief_id: created.brief_id.clone(),
            channel: Channel::Email,
            tone: None,
            use_rag: false,
            user_id: tenant.user_id.clone(),
        },
    )
    .await
    .unwrap();

    {
        let store = state.store.lock();
        store
            .create_comment(
                &generated.variants[0].id,
                &tenant.user_id,
                "needs a subject line",
                None,
            )
            .unwrap();
        store
            .update_version_text(
                &generated.variants[0].id,
                "Edited before deletion",
                &tenant.user_id,
                None,
            )
            .unwrap();
    }

    briefs::delete_brief(&state, &created.brief_id).unwrap();

    let store = state.store.lock();
    for table in [
        "briefs",
        "content_requests",
        "content_versions",
        "content_comments",
        "content_edit_history",
        "media_attachments",
    ] {
        let count: i64 = store
            .conn_ref()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0, "{table} should be empty after cascade delete");
    }
}
