//! Request handlers. Each one deserializes, calls into the service/store
//! layer, and wraps the result in the response envelope.

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{ok, ApiError, ApiResponse};
use crate::db::{
    BriefDetail, BriefOverview, CommentWithAuthor, DbAnalyticsAggregate, DbComment,
    DbContentRequest, DbContentVersion, DbEngagementEvent, DbOrganization, DbPlatformConnection,
    DbPublishedPost, DbSchedule, DbUsagePeriod, DbUser, FileOverview, NewConnection,
    NewEngagementEvent, RequestDetail, ScheduleOverview, VersionDetail,
};
use crate::services::briefs::{self, BriefCreated, CreateBriefInput};
use crate::services::content::{self, GenerateContentInput, GenerationResult};
use crate::services::schedules::{self, CreateScheduleInput};
use crate::services::uploads::{self, UploadInput, UploadResult};
use crate::state::SharedState;
use crate::types::{Channel, ConnectionMeta, Plan, PlanLimits, Role, ScheduleStatus};

pub async fn health() -> Json<ApiResponse<&'static str>> {
    ok("ok")
}

// ---------------------------------------------------------------------------
// Organizations & users
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrganizationBody {
    pub name: String,
    pub slug: Option<String>,
    pub plan: Option<Plan>,
    pub billing_customer_id: Option<String>,
}

pub async fn create_organization(
    State(state): State<SharedState>,
    Json(body): Json<CreateOrganizationBody>,
) -> Result<Json<ApiResponse<DbOrganization>>, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("organization name is required"));
    }
    let slug = body
        .slug
        .clone()
        .unwrap_or_else(|| crate::util::slugify(&body.name));

    let org = state.store.lock().create_organization(
        &body.name,
        &slug,
        body.plan,
        body.billing_customer_id.as_deref(),
    )?;
    Ok(ok(org))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationWithUsage {
    #[serde(flatten)]
    pub organization: DbOrganization,
    pub current_usage: Option<DbUsagePeriod>,
    pub plan_limits: PlanLimits,
}

pub async fn organization_by_slug(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<OrganizationWithUsage>>, ApiError> {
    let store = state.store.lock();
    let org = store
        .get_organization_by_slug(&slug)?
        .ok_or_else(|| not_found("organization", &slug))?;
    let (organization, current_usage) = store
        .organization_with_usage(&org.id)?
        .ok_or_else(|| not_found("organization", &slug))?;

    let plan_limits = PlanLimits::for_plan(organization.plan);
    Ok(ok(OrganizationWithUsage {
        organization,
        current_usage,
        plan_limits,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserBody {
    pub external_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
    pub organization_id: String,
}

pub async fn create_user(
    State(state): State<SharedState>,
    Json(body): Json<CreateUserBody>,
) -> Result<Json<ApiResponse<DbUser>>, ApiError> {
    if body.email.trim().is_empty() || body.external_id.trim().is_empty() {
        return Err(ApiError::bad_request("externalId and email are required"));
    }
    let user = state.store.lock().create_user(
        &body.external_id,
        &body.email,
        body.first_name.as_deref(),
        body.last_name.as_deref(),
        body.role,
        &body.organization_id,
    )?;
    Ok(ok(user))
}

// ---------------------------------------------------------------------------
// Briefs
// ---------------------------------------------------------------------------

pub async fn create_brief(
    State(state): State<SharedState>,
    Json(body): Json<CreateBriefInput>,
) -> Result<Json<ApiResponse<BriefCreated>>, ApiError> {
    Ok(ok(briefs::create_brief(&state, &body)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgScopedQuery {
    pub organization_id: String,
    pub limit: Option<usize>,
}

pub async fn list_briefs(
    State(state): State<SharedState>,
    Query(query): Query<OrgScopedQuery>,
) -> Result<Json<ApiResponse<Vec<BriefOverview>>>, ApiError> {
    Ok(ok(briefs::list_recent(
        &state,
        &query.organization_id,
        query.limit.unwrap_or(10),
    )?))
}

pub async fn get_brief(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<BriefDetail>>, ApiError> {
    Ok(ok(briefs::brief_detail(&state, &id)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBriefBody {
    pub input_text: Option<String>,
    pub input_audio_path: Option<String>,
    pub language: Option<String>,
}

pub async fn update_brief(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateBriefBody>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    briefs::update_brief(
        &state,
        &id,
        body.input_text.as_deref(),
        body.input_audio_path.as_deref(),
        body.language.as_deref(),
    )?;
    Ok(ok("updated"))
}

pub async fn delete_brief(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    briefs::delete_brief(&state, &id)?;
    Ok(ok("deleted"))
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

pub async fn generate_content(
    State(state): State<SharedState>,
    Json(body): Json<GenerateContentInput>,
) -> Result<Json<ApiResponse<GenerationResult>>, ApiError> {
    Ok(ok(content::generate_content(&state, &body).await?))
}

pub async fn get_request(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<RequestDetail>>, ApiError> {
    Ok(ok(content::request_detail(&state, &id)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewBody {
    pub user_id: String,
    pub reason: Option<String>,
}

pub async fn approve_request(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<ReviewBody>,
) -> Result<Json<ApiResponse<DbContentRequest>>, ApiError> {
    Ok(ok(content::approve(&state, &id, &body.user_id)?))
}

pub async fn reject_request(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<ReviewBody>,
) -> Result<Json<ApiResponse<DbContentRequest>>, ApiError> {
    Ok(ok(content::reject(
        &state,
        &id,
        &body.user_id,
        body.reason.as_deref(),
    )?))
}

pub async fn get_version(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<VersionDetail>>, ApiError> {
    Ok(ok(content::version_detail(&state, &id)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditVersionBody {
    pub content_text: String,
    pub user_id: String,
    pub edit_reason: Option<String>,
}

pub async fn edit_version(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<EditVersionBody>,
) -> Result<Json<ApiResponse<DbContentVersion>>, ApiError> {
    Ok(ok(content::edit_version(
        &state,
        &id,
        &body.content_text,
        &body.user_id,
        body.edit_reason.as_deref(),
    )?))
}

pub async fn select_version(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    content::select_version(&state, &id)?;
    Ok(ok("selected"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentBody {
    pub user_id: String,
    pub comment: String,
    pub parent_comment_id: Option<String>,
}

pub async fn create_comment(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<CreateCommentBody>,
) -> Result<Json<ApiResponse<DbComment>>, ApiError> {
    if body.comment.trim().is_empty() {
        return Err(ApiError::bad_request("comment cannot be empty"));
    }
    let comment = state.store.lock().create_comment(
        &id,
        &body.user_id,
        &body.comment,
        body.parent_comment_id.as_deref(),
    )?;
    Ok(ok(comment))
}

pub async fn list_comments(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<CommentWithAuthor>>>, ApiError> {
    Ok(ok(state.store.lock().list_comments(&id)?))
}

// ---------------------------------------------------------------------------
// Uploads & files
// ---------------------------------------------------------------------------

pub async fn upload(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UploadResult>>, ApiError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename = String::new();
    let mut file_type = String::new();
    let mut language: Option<String> = None;
    let mut organization_id: Option<String> = None;
    let mut user_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                filename = field.file_name().unwrap_or("upload").to_string();
                file_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed reading file: {e}")))?;
                file_bytes = Some(bytes.to_vec());
            }
            "language" => {
                language = field.text().await.ok();
            }
            "organizationId" => {
                organization_id = field.text().await.ok();
            }
            "userId" => {
                user_id = field.text().await.ok();
            }
            _ => {}
        }
    }

    let bytes = file_bytes.ok_or_else(|| ApiError::bad_request("no file provided"))?;
    let organization_id =
        organization_id.ok_or_else(|| ApiError::bad_request("organizationId is required"))?;
    let user_id = user_id.ok_or_else(|| ApiError::bad_request("userId is required"))?;

    let result = uploads::upload_file(
        &state,
        UploadInput {
            filename: &filename,
            file_type: &file_type,
            bytes: &bytes,
            language: language.as_deref(),
            organization_id: &organization_id,
            user_id: &user_id,
        },
    )
    .await?;
    Ok(ok(result))
}

pub async fn list_files(
    State(state): State<SharedState>,
    Query(query): Query<OrgScopedQuery>,
) -> Result<Json<ApiResponse<Vec<FileOverview>>>, ApiError> {
    Ok(ok(state.store.lock().list_files(&query.organization_id)?))
}

pub async fn delete_file(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    state.store.lock().delete_file(&id)?;
    Ok(ok("deleted"))
}

// ---------------------------------------------------------------------------
// Platform connections
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConnectionBody {
    pub organization_id: String,
    pub platform: Channel,
    pub account_id: String,
    pub account_name: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<i64>,
    pub metadata: Option<ConnectionMeta>,
    pub connected_by: String,
}

pub async fn create_connection(
    State(state): State<SharedState>,
    Json(body): Json<CreateConnectionBody>,
) -> Result<Json<ApiResponse<DbPlatformConnection>>, ApiError> {
    let metadata = body
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| ApiError::bad_request(format!("invalid metadata: {e}")))?;

    let connection = state.store.lock().create_connection(NewConnection {
        organization_id: &body.organization_id,
        platform: body.platform,
        account_id: &body.account_id,
        account_name: &body.account_name,
        access_token: &body.access_token,
        refresh_token: body.refresh_token.as_deref(),
        token_expires_at: body.token_expires_at,
        metadata: metadata.as_deref(),
        connected_by: &body.connected_by,
    })?;
    Ok(ok(connection))
}

pub async fn list_connections(
    State(state): State<SharedState>,
    Query(query): Query<OrgScopedQuery>,
) -> Result<Json<ApiResponse<Vec<DbPlatformConnection>>>, ApiError> {
    Ok(ok(state
        .store
        .lock()
        .list_connections(&query.organization_id)?))
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

pub async fn create_schedule(
    State(state): State<SharedState>,
    Json(body): Json<CreateScheduleInput>,
) -> Result<Json<ApiResponse<DbSchedule>>, ApiError> {
    Ok(ok(schedules::create_schedule(&state, &body)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleListQuery {
    pub organization_id: String,
    pub status: Option<ScheduleStatus>,
    pub limit: Option<usize>,
}

pub async fn list_schedules(
    State(state): State<SharedState>,
    Query(query): Query<ScheduleListQuery>,
) -> Result<Json<ApiResponse<Vec<ScheduleOverview>>>, ApiError> {
    Ok(ok(schedules::list_schedules(
        &state,
        &query.organization_id,
        query.status,
        query.limit.unwrap_or(50),
    )?))
}

pub async fn upcoming_schedules(
    State(state): State<SharedState>,
    Query(query): Query<OrgScopedQuery>,
) -> Result<Json<ApiResponse<Vec<DbSchedule>>>, ApiError> {
    Ok(ok(schedules::upcoming(
        &state,
        &query.organization_id,
        query.limit.unwrap_or(20),
    )?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishBody {
    pub platform_post_id: String,
    pub platform_post_url: String,
    pub platform_connection_id: String,
}

pub async fn publish_schedule(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<PublishBody>,
) -> Result<Json<ApiResponse<DbPublishedPost>>, ApiError> {
    Ok(ok(schedules::mark_published(
        &state,
        &id,
        &body.platform_post_id,
        &body.platform_post_url,
        &body.platform_connection_id,
    )?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailBody {
    pub error_message: String,
    #[serde(default)]
    pub should_retry: bool,
}

pub async fn fail_schedule(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<FailBody>,
) -> Result<Json<ApiResponse<DbSchedule>>, ApiError> {
    Ok(ok(schedules::mark_failed(
        &state,
        &id,
        &body.error_message,
        body.should_retry,
    )?))
}

pub async fn cancel_schedule(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DbSchedule>>, ApiError> {
    Ok(ok(schedules::cancel(&state, &id)?))
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementEventBody {
    pub organization_id: String,
    pub content_version_id: Option<String>,
    pub published_post_id: Option<String>,
    pub event_type: String,
    pub value: Option<i64>,
    pub raw_payload: Option<serde_json::Value>,
}

pub async fn record_event(
    State(state): State<SharedState>,
    Json(body): Json<EngagementEventBody>,
) -> Result<Json<ApiResponse<DbEngagementEvent>>, ApiError> {
    if body.event_type.trim().is_empty() {
        return Err(ApiError::bad_request("eventType is required"));
    }
    let raw_payload = body
        .raw_payload
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| ApiError::bad_request(format!("invalid rawPayload: {e}")))?;

    let event = state
        .store
        .lock()
        .record_engagement_event(NewEngagementEvent {
            organization_id: &body.organization_id,
            content_version_id: body.content_version_id.as_deref(),
            published_post_id: body.published_post_id.as_deref(),
            event_type: &body.event_type,
            value: body.value,
            raw_payload: raw_payload.as_deref(),
        })?;
    Ok(ok(event))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    pub organization_id: String,
    pub period: Option<String>,
    /// Window in days counted back from now.
    pub days: Option<i64>,
}

pub async fn analytics(
    State(state): State<SharedState>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<ApiResponse<Vec<DbAnalyticsAggregate>>>, ApiError> {
    let cutoff = query
        .days
        .map(|days| crate::util::now_ms() - days * 24 * 60 * 60 * 1000);
    let aggregates = state.store.lock().list_aggregates(
        &query.organization_id,
        query.period.as_deref(),
        cutoff,
        None,
    )?;
    Ok(ok(aggregates))
}

fn not_found(entity: &'static str, id: &str) -> ApiError {
    ApiError::from(crate::db::DbError::NotFound {
        entity,
        id: id.to_string(),
    })
}
