//! Brief lifecycle: creation fan-out, detail assembly, edits, cascade
//! delete.

use serde::{Deserialize, Serialize};

use super::ServiceError;
use crate::db::{BriefDetail, BriefOverview, NewBrief};
use crate::state::AppState;
use crate::types::Channel;

/// Variants-per-request bounds accepted at creation.
const MIN_VARIANTS: i64 = 1;
const MAX_VARIANTS: i64 = 5;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBriefInput {
    pub input_text: Option<String>,
    pub input_audio_path: Option<String>,
    pub language: Option<String>,
    pub organization_id: String,
    pub user_id: String,
    pub channels: Vec<Channel>,
    pub tone: Option<String>,
    pub variants_requested: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefCreated {
    pub brief_id: String,
    pub content_request_ids: Vec<String>,
}

/// Create a brief and one DRAFTED content request per channel.
pub fn create_brief(state: &AppState, input: &CreateBriefInput) -> Result<BriefCreated, ServiceError> {
    let has_text = input
        .input_text
        .as_deref()
        .is_some_and(|t| !t.trim().is_empty());
    let has_audio = input
        .input_audio_path
        .as_deref()
        .is_some_and(|p| !p.is_empty());
    if !has_text && !has_audio {
        return Err(ServiceError::validation("brief text or audio is required"));
    }
    if input.channels.is_empty() {
        return Err(ServiceError::validation("at least one channel is required"));
    }
    if let Some(variants) = input.variants_requested {
        if !(MIN_VARIANTS..=MAX_VARIANTS).contains(&variants) {
            return Err(ServiceError::validation(format!(
                "variantsRequested must be between {MIN_VARIANTS} and {MAX_VARIANTS}"
            )));
        }
    }

    let store = state.store.lock();
    if store.get_organization(&input.organization_id)?.is_none() {
        return Err(ServiceError::Db(crate::db::DbError::NotFound {
            entity: "organization",
            id: input.organization_id.clone(),
        }));
    }

    let (brief, requests) = store.create_brief(NewBrief {
        input_text: input.input_text.as_deref(),
        input_audio_path: input.input_audio_path.as_deref(),
        language: input.language.as_deref(),
        organization_id: &input.organization_id,
        user_id: &input.user_id,
        channels: &input.channels,
        tone: input.tone.as_deref(),
        variants_requested: input.variants_requested,
    })?;

    Ok(BriefCreated {
        brief_id: brief.id,
        content_request_ids: requests.into_iter().map(|r| r.id).collect(),
    })
}

pub fn brief_detail(state: &AppState, brief_id: &str) -> Result<BriefDetail, ServiceError> {
    state
        .store
        .lock()
        .brief_detail(brief_id)?
        .ok_or_else(|| {
            ServiceError::Db(crate::db::DbError::NotFound {
                entity: "brief",
                id: brief_id.to_string(),
            })
        })
}

pub fn list_recent(
    state: &AppState,
    organization_id: &str,
    limit: usize,
) -> Result<Vec<BriefOverview>, ServiceError> {
    Ok(state.store.lock().list_recent_briefs(organization_id, limit)?)
}

pub fn update_brief(
    state: &AppState,
    brief_id: &str,
    input_text: Option<&str>,
    input_audio_path: Option<&str>,
    language: Option<&str>,
) -> Result<(), ServiceError> {
    Ok(state
        .store
        .lock()
        .update_brief(brief_id, input_text, input_audio_path, language)?)
}

pub fn delete_brief(state: &AppState, brief_id: &str) -> Result<(), ServiceError> {
    Ok(state.store.lock().delete_brief(brief_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Store;
    use crate::generation::provider::StubProvider;
    use crate::state::SharedState;
    use std::sync::Arc;

    fn test_state() -> SharedState {
        let store = Store::open_in_memory().unwrap();
        crate::state::AppState::new(store, Arc::new(StubProvider::new()), Config::default())
    }

    fn seed(state: &AppState) -> (String, String) {
        let store = state.store.lock();
        let org = store
            .create_organization("Acme", "acme", None, None)
            .unwrap();
        let user = store
            .create_user("idp|1", "sam@acme.com", None, None, None, &org.id)
            .unwrap();
        (org.id, user.id)
    }

    #[test]
    fn test_create_brief_validates_inputs() {
        let state = test_state();
        let (org_id, user_id) = seed(&state);

        let empty_text = CreateBriefInput {
            input_text: Some("   ".to_string()),
            input_audio_path: None,
            language: None,
            organization_id: org_id.clone(),
            user_id: user_id.clone(),
            channels: vec![Channel::Blog],
            tone: None,
            variants_requested: None,
        };
        assert!(matches!(
            create_brief(&state, &empty_text).unwrap_err(),
            ServiceError::Validation(_)
        ));

        let no_channels = CreateBriefInput {
            input_text: Some("real text".to_string()),
            input_audio_path: None,
            language: None,
            organization_id: org_id.clone(),
            user_id: user_id.clone(),
            channels: vec![],
            tone: None,
            variants_requested: None,
        };
        assert!(matches!(
            create_brief(&state, &no_channels).unwrap_err(),
            ServiceError::Validation(_)
        ));

        let too_many_variants = CreateBriefInput {
            input_text: Some("real text".to_string()),
            input_audio_path: None,
            language: None,
            organization_id: org_id,
            user_id,
            channels: vec![Channel::Blog],
            tone: None,
            variants_requested: Some(9),
        };
        assert!(matches!(
            create_brief(&state, &too_many_variants).unwrap_err(),
            ServiceError::Validation(_)
        ));
    }

    #[test]
    fn test_create_brief_returns_request_ids() {
        let state = test_state();
        let (org_id, user_id) = seed(&state);

        let created = create_brief(
            &state,
            &CreateBriefInput {
                input_text: Some("Spring launch".to_string()),
                input_audio_path: None,
                language: Some("de".to_string()),
                organization_id: org_id,
                user_id,
                channels: vec![Channel::Instagram, Channel::Blog],
                tone: None,
                variants_requested: Some(3),
            },
        )
        .unwrap();

        assert_eq!(created.content_request_ids.len(), 2);
        let detail = brief_detail(&state, &created.brief_id).unwrap();
        assert_eq!(detail.brief.language, "de");
    }

    #[test]
    fn test_unknown_organization_is_not_found() {
        let state = test_state();
        let err = create_brief(
            &state,
            &CreateBriefInput {
                input_text: Some("text".to_string()),
                input_audio_path: None,
                language: None,
                organization_id: "missing".to_string(),
                user_id: "u".to_string(),
                channels: vec![Channel::Blog],
                tone: None,
                variants_requested: None,
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Db(crate::db::DbError::NotFound { .. })
        ));
    }
}
