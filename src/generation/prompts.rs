//! Generation prompt construction.
//!
//! One fixed instruction per channel plus the strict JSON output contract.
//! Retrieved sources are quoted with their filename so the model can cite
//! chunk ids back in the `sources` array.

use crate::retrieval::RagSource;
use crate::types::Channel;

/// Channel-specific writing instruction.
pub fn channel_instruction(channel: Channel) -> &'static str {
    match channel {
        Channel::Instagram => {
            "Write engaging Instagram captions with relevant hashtags. Keep it visual and story-driven."
        }
        Channel::Facebook => {
            "Write Facebook posts that encourage engagement and sharing. Use a conversational tone."
        }
        Channel::Twitter => {
            "Write concise Twitter posts under 280 characters. Use hashtags strategically."
        }
        Channel::Linkedin => {
            "Write professional LinkedIn posts that add value to your network. Use industry insights."
        }
        Channel::Blog => {
            "Write comprehensive blog post content with clear structure and actionable insights."
        }
        Channel::Email => {
            "Write clear, professional email content with compelling subject lines."
        }
        Channel::Whatsapp => {
            "Write concise WhatsApp messages that are personal and direct."
        }
    }
}

/// System prompt for a generation call.
pub fn build_system_prompt(
    channel: Channel,
    tone: Option<&str>,
    sources: &[RagSource],
) -> String {
    let mut prompt = format!(
        "You are Copydesk, an AI content assistant. Generate 3 high-quality content variants for {channel}.\n\
         \n\
         {instruction}\n",
        channel = channel.as_str(),
        instruction = channel_instruction(channel),
    );

    if let Some(tone) = tone {
        prompt.push_str(&format!("\nTone: {tone}\n"));
    }

    prompt.push_str(
        "\nReturn your response as JSON in this exact format:\n\
         {\n\
         \x20 \"variants\": [\n\
         \x20   {\n\
         \x20     \"text\": \"content here\",\n\
         \x20     \"suggestedHashtags\": [\"#tag1\", \"#tag2\"],\n\
         \x20     \"suggestedImagePrompt\": \"optional image description\",\n\
         \x20     \"sources\": [\"chunk_id_1\", \"chunk_id_2\"]\n\
         \x20   }\n\
         \x20 ]\n\
         }",
    );

    if !sources.is_empty() {
        prompt.push_str("\n\nUse these organization-specific sources to inform your content:\n");
        for (index, source) in sources.iter().enumerate() {
            prompt.push_str(&format!(
                "{}) [{}] \"{}\"\n",
                index + 1,
                source.filename,
                source.snippet
            ));
        }
        prompt.push_str(
            "\nReference relevant sources in your content and include their chunk IDs in the sources array.",
        );
    }

    prompt
}

/// User message for a generation call.
pub fn build_user_prompt(brief_text: &str) -> String {
    format!("Generate 3 variants for this brief: {brief_text}")
}
