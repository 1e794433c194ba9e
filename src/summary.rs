//! Short relevance summaries attached to podcast results.

use std::sync::Arc;

use crate::llm::{LlmClient, TextRequest};
use crate::models::ContentDocument;

const MAX_WORDS: usize = 60;

pub struct Summarizer {
    llm: Arc<dyn LlmClient>,
    model: String,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    /// How `document` relates to `query`, in at most 60 English words.
    ///
    /// `None` if the model is unavailable or answers with nothing.
    pub async fn summarize(&self, document: &ContentDocument, query: &str) -> Option<String> {
        let request = TextRequest {
            prompt: summary_prompt(document, query),
            model: Some(self.model.clone()),
        };

        match self.llm.complete_text(request).await {
            Ok(text) => {
                let text = clamp_words(text.trim(), MAX_WORDS);
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
            Err(e) => {
                tracing::warn!(title = %document.title, error = %e, "summary generation failed");
                None
            }
        }
    }
}

fn clamp_words(text: &str, max: usize) -> String {
    text.split_whitespace().take(max).collect::<Vec<_>>().join(" ")
}

fn summary_prompt(document: &ContentDocument, query: &str) -> String {
    format!(
        r#"Summarize how the podcast episode below relates to the user's query.

- Respond in English, in no more than 60 words.
- Output only the summary.
- If the episode is not directly about the query, explain how it is still related.

Title: {title}
Description: {description}
Tags: {tags}
Content:
{content}

User query: {query}"#,
        title = document.title,
        description = document.description,
        tags = document.tags.join(", "),
        content = document.content,
    )
}
