//! Controlled tag vocabulary: extraction and query resolution.
//!
//! Documents are tagged at ingest time with [`TagGenerator::extract_tags`];
//! the tags are merged into the category's vocabulary by the caller. At query
//! time a query is mapped back onto that vocabulary under a [`MatchPolicy`].
//!
//! Whatever the model answers, resolution output is always a subset of the
//! stored vocabulary: anything else is dropped as noise. LLM outages and
//! malformed answers degrade to no tags; only a missing credential fails.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::Result;
use crate::llm::{string_array_schema, structured, JsonRequest, LlmClient};
use crate::models::{MatchPolicy, TagCategory};
use crate::store::TagStore;

#[derive(Debug, Deserialize)]
struct TagsResponse {
    tags: Vec<String>,
}

pub struct TagGenerator {
    llm: Arc<dyn LlmClient>,
    tags: Arc<dyn TagStore>,
}

impl TagGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, tags: Arc<dyn TagStore>) -> Self {
        Self { llm, tags }
    }

    /// Extract finance tags from a document body.
    ///
    /// Audio content yields up to 30 tags, news up to 5. Empty content
    /// returns no tags without calling the model.
    pub async fn extract_tags(&self, content: &str, category: TagCategory) -> Result<Vec<String>> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let request = JsonRequest::new(
            "document_tags",
            extraction_prompt(content, category),
            string_array_schema("tags"),
        );

        match structured::<TagsResponse>(self.llm.as_ref(), request).await {
            Ok(resp) => Ok(normalize_tags(resp.tags, category.max_tags())),
            Err(e) if e.is_configuration() => Err(e),
            Err(e) => {
                tracing::warn!(category = %category, error = %e, "tag extraction failed");
                Ok(Vec::new())
            }
        }
    }

    pub async fn resolve(
        &self,
        query: &str,
        category: TagCategory,
        policy: MatchPolicy,
    ) -> Result<Vec<String>> {
        match policy {
            MatchPolicy::Exact => self.resolve_exact(query, category).await,
            MatchPolicy::Fuzzy => self.resolve_fuzzy(query, category).await,
        }
    }

    /// Vocabulary tags that a query mentions, verbatim.
    pub async fn resolve_exact(&self, query: &str, category: TagCategory) -> Result<Vec<String>> {
        let vocabulary = match self.vocabulary_for(query, category).await? {
            Some(v) => v,
            None => return Ok(Vec::new()),
        };

        let answer = self
            .ask(
                "query_tags_exact",
                exact_prompt(query, &vocabulary),
                category,
            )
            .await?;
        Ok(keep_exact(answer, &vocabulary))
    }

    /// Vocabulary tags semantically related to a query, most relevant first.
    pub async fn resolve_fuzzy(&self, query: &str, category: TagCategory) -> Result<Vec<String>> {
        let vocabulary = match self.vocabulary_for(query, category).await? {
            Some(v) => v,
            None => return Ok(Vec::new()),
        };

        let answer = self
            .ask(
                "query_tags_fuzzy",
                fuzzy_prompt(query, &vocabulary),
                category,
            )
            .await?;
        Ok(keep_canonical(answer, &vocabulary))
    }

    /// `None` when there is nothing to resolve against.
    async fn vocabulary_for(&self, query: &str, category: TagCategory) -> Result<Option<Vec<String>>> {
        if query.trim().is_empty() {
            return Ok(None);
        }
        let vocabulary = self.tags.get(category).await?;
        if vocabulary.is_empty() {
            tracing::debug!(category = %category, "empty vocabulary, skipping resolution");
            return Ok(None);
        }
        Ok(Some(vocabulary))
    }

    async fn ask(&self, name: &str, prompt: String, category: TagCategory) -> Result<Vec<String>> {
        let request = JsonRequest::new(name, prompt, string_array_schema("tags"));
        match structured::<TagsResponse>(self.llm.as_ref(), request).await {
            Ok(resp) => Ok(resp.tags),
            Err(e) if e.is_configuration() => Err(e),
            Err(e) => {
                tracing::warn!(category = %category, error = %e, "tag resolution failed");
                Ok(Vec::new())
            }
        }
    }
}

/// Trim, collapse inner whitespace, drop blanks and repeats, cap the count.
pub fn normalize_tags(raw: Vec<String>, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .take(max)
        .collect()
}

fn keep_exact(answer: Vec<String>, vocabulary: &[String]) -> Vec<String> {
    let vocab: HashSet<&str> = vocabulary.iter().map(|s| s.as_str()).collect();
    let mut seen = HashSet::new();
    answer
        .into_iter()
        .filter(|t| vocab.contains(t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn fold(tag: &str) -> String {
    tag.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Map answers back to the vocabulary's own spelling.
fn keep_canonical(answer: Vec<String>, vocabulary: &[String]) -> Vec<String> {
    let exact: HashSet<&str> = vocabulary.iter().map(|s| s.as_str()).collect();
    let mut folded: HashMap<String, &str> = HashMap::new();
    for tag in vocabulary {
        folded.entry(fold(tag)).or_insert(tag.as_str());
    }

    let mut seen = HashSet::new();
    answer
        .iter()
        .filter_map(|t| {
            if exact.contains(t.as_str()) {
                Some(t.clone())
            } else {
                folded.get(&fold(t)).map(|c| c.to_string())
            }
        })
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn extraction_prompt(content: &str, category: TagCategory) -> String {
    let quantity = match category {
        TagCategory::Audio => {
            "Return between 15 and 30 tags. If the text supports fewer, return only those; never pad."
        }
        TagCategory::News => "Return at most 5 tags, the most central ones first.",
    };

    format!(
        r#"Extract tags from the text below for filtering a financial search index.

Rules:
- Only stock market, investing, and economics concepts.
- Every tag must be supported by the text.
- Prefer specific entities: companies ("Apple", "Tesla"), tickers ("NVDA"), instruments ("ETFs", "bonds"), indicators ("inflation", "interest rates"), people ("Warren Buffett"), market concepts ("quantitative easing", "IPO").
- Avoid broad terms unless they are the main subject.
- Each tag is 1 to 3 words.
- {quantity}

Examples of good tags: Apple (AAPL), Magnificent Seven, Interest Rates, Recession, Bull Market, Chinese Stock Market, Real Estate, Investment Strategy.

---TEXT_START---
{content}
---TEXT_END---"#
    )
}

fn exact_prompt(query: &str, vocabulary: &[String]) -> String {
    format!(
        r#"Match a user query against a fixed list of tags.

Return only tags that appear EXACTLY as written in the list below. Do not change capitalization, do not add ticker symbols, do not add, remove, merge, or split words, and never invent tags. Select only tags for concepts the query actually mentions. If nothing matches, return an empty list.

Example:
Query: "news about Apple and Tesla stock prices"
Tags: ["Apple", "Microsoft", "Tesla", "Stock Market", "Revenue"]
Answer: ["Apple", "Tesla", "Stock Market"]
Wrong: ["Apple (AAPL)", "Tesla (TSLA)", "Stock Prices"]

---QUERY_START---
{query}
---QUERY_END---

---TAGS_START---
{tags}
---TAGS_END---"#,
        tags = vocabulary.join(", ")
    )
}

fn fuzzy_prompt(query: &str, vocabulary: &[String]) -> String {
    format!(
        r#"Pick tags from the list below that are semantically related to a user query, for example companies in the same sector, related indicators, or broader market themes the query touches.

Order them from most to least relevant and return at least 10 when the list allows it. Copy each tag exactly as it is written in the list; never invent tags.

---QUERY_START---
{query}
---QUERY_END---

---TAGS_START---
{tags}
---TAGS_END---"#,
        tags = vocabulary.join(", ")
    )
}
