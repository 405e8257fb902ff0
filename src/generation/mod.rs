//! Content generation adapter.
//!
//! Builds the channel prompt, calls the provider, and parses the strict
//! JSON variant contract. Any provider or parse failure degrades to the
//! deterministic template so callers always receive exactly
//! [`VARIANTS_PER_REQUEST`] variants with non-empty text and hashtags.

pub mod prompts;
pub mod provider;

use serde::Deserialize;

use crate::retrieval::RagSource;
use crate::types::{Channel, ContentVariant};
use crate::util::truncate_chars;
use provider::TextProvider;

/// Every generation produces exactly this many variants.
pub const VARIANTS_PER_REQUEST: usize = 3;

/// Characters of the brief kept by the fallback template.
const FALLBACK_BRIEF_CHARS: usize = 100;

/// Model label recorded when the fallback template produced the variants.
pub const FALLBACK_MODEL: &str = "fallback-template";

/// Outcome of one generation call.
pub struct GenerationOutcome {
    pub variants: Vec<ContentVariant>,
    /// Provider model, or [`FALLBACK_MODEL`] when the template ran.
    pub model_used: String,
}

#[derive(Debug, Deserialize)]
struct VariantsEnvelope {
    variants: Vec<ContentVariant>,
}

/// Parse the provider response against the variant contract.
///
/// Rejects payloads with the wrong variant count, empty text, or an empty
/// hashtag list; those fall back rather than persisting junk.
fn parse_variants(raw: &str) -> Option<Vec<ContentVariant>> {
    let envelope: VariantsEnvelope = serde_json::from_str(raw).ok()?;
    let variants = envelope.variants;
    if variants.len() != VARIANTS_PER_REQUEST {
        return None;
    }
    if variants
        .iter()
        .any(|v| v.text.trim().is_empty() || v.suggested_hashtags.is_empty())
    {
        return None;
    }
    Some(variants)
}

/// Deterministic template used when the provider is unavailable: the brief
/// truncated to 100 characters plus one of three fixed hashtag pairs.
pub fn fallback_variants(brief_text: &str) -> Vec<ContentVariant> {
    let base = if brief_text.chars().count() > FALLBACK_BRIEF_CHARS {
        format!("{}...", truncate_chars(brief_text, FALLBACK_BRIEF_CHARS))
    } else {
        brief_text.to_string()
    };

    let fixtures: [(&str, &str, &str); 3] = [
        ("#content", "#social", "Professional image related to the content"),
        ("#engagement", "#community", "Engaging visual that tells a story"),
        ("#brand", "#value", "Clean, branded image with clear messaging"),
    ];

    fixtures
        .iter()
        .map(|(tag_a, tag_b, image_prompt)| ContentVariant {
            text: format!("{base} {tag_a} {tag_b}"),
            suggested_hashtags: vec![tag_a.to_string(), tag_b.to_string()],
            suggested_image_prompt: Some(image_prompt.to_string()),
            sources: None,
        })
        .collect()
}

/// Generate variants for a brief on one channel.
///
/// `sources` are the ranked retrieval hits (possibly empty); they are quoted
/// into the prompt and echoed onto each variant that does not cite its own.
pub async fn generate_variants(
    provider: &dyn TextProvider,
    brief_text: &str,
    channel: Channel,
    tone: Option<&str>,
    sources: &[RagSource],
) -> GenerationOutcome {
    let system_prompt = prompts::build_system_prompt(channel, tone, sources);
    let user_prompt = prompts::build_user_prompt(brief_text);

    match provider.chat(&system_prompt, &user_prompt).await {
        Ok(raw) => match parse_variants(&raw) {
            Some(variants) => GenerationOutcome {
                variants,
                model_used: provider.model_name().to_string(),
            },
            None => {
                log::warn!(
                    "generation response failed contract parse for {}; using fallback",
                    channel
                );
                GenerationOutcome {
                    variants: fallback_variants(brief_text),
                    model_used: FALLBACK_MODEL.to_string(),
                }
            }
        },
        Err(e) => {
            log::warn!("generation call failed for {}: {}; using fallback", channel, e);
            GenerationOutcome {
                variants: fallback_variants(brief_text),
                model_used: FALLBACK_MODEL.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider::StubProvider;

    #[test]
    fn test_fallback_always_three_nonempty_variants() {
        let variants = fallback_variants("Announce the beta");
        assert_eq!(variants.len(), VARIANTS_PER_REQUEST);
        for variant in &variants {
            assert!(!variant.text.trim().is_empty());
            assert!(!variant.suggested_hashtags.is_empty());
        }
        assert!(variants[0].text.contains("#content"));
        assert!(variants[1].text.contains("#community"));
    }

    #[test]
    fn test_fallback_truncates_long_briefs() {
        let long_brief = "b".repeat(250);
        let variants = fallback_variants(&long_brief);
        assert!(variants[0].text.starts_with(&"b".repeat(100)));
        assert!(variants[0].text.contains("..."));
        assert!(!variants[0].text.contains(&"b".repeat(101)));
    }

    #[test]
    fn test_parse_rejects_contract_violations() {
        // Wrong count
        assert!(parse_variants(
            r##"{"variants":[{"text":"a","suggestedHashtags":["#x"]}]}"##
        )
        .is_none());
        // Empty text
        assert!(parse_variants(
            r##"{"variants":[
                {"text":"","suggestedHashtags":["#x"]},
                {"text":"b","suggestedHashtags":["#x"]},
                {"text":"c","suggestedHashtags":["#x"]}]}"##
        )
        .is_none());
        // Not JSON at all
        assert!(parse_variants("I'm sorry, I can't do that").is_none());

        let ok = parse_variants(
            r##"{"variants":[
                {"text":"a","suggestedHashtags":["#x"],"sources":["c1"]},
                {"text":"b","suggestedHashtags":["#x"]},
                {"text":"c","suggestedHashtags":["#x"],"suggestedImagePrompt":"sunset"}]}"##,
        )
        .expect("valid contract");
        assert_eq!(ok.len(), 3);
        assert_eq!(ok[0].sources.as_deref(), Some(&["c1".to_string()][..]));
    }

    #[tokio::test]
    async fn test_generate_uses_provider_when_healthy() {
        let provider = StubProvider::new();
        let outcome =
            generate_variants(&provider, "Launch day", Channel::Instagram, None, &[]).await;
        assert_eq!(outcome.variants.len(), 3);
        assert_eq!(outcome.model_used, "stub");
    }

    #[tokio::test]
    async fn test_generate_falls_back_on_provider_failure() {
        let provider = StubProvider::failing();
        let outcome =
            generate_variants(&provider, "Launch day", Channel::Twitter, Some("dry"), &[]).await;
        assert_eq!(outcome.variants.len(), VARIANTS_PER_REQUEST);
        assert_eq!(outcome.model_used, FALLBACK_MODEL);
        for variant in &outcome.variants {
            assert!(!variant.text.trim().is_empty());
            assert!(!variant.suggested_hashtags.is_empty());
        }
    }
}
