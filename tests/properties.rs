//! Property tests for tag merging, tag resolution and retrieval.

mod common;

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;
use serde_json::{json, Value};

use common::KeywordEmbedder;
use finsight::error::Result;
use finsight::llm::{JsonRequest, LlmClient, TextRequest};
use finsight::models::{ContentDocument, SourceType, TagCategory};
use finsight::retrieve::{RetrieveOptions, Retriever};
use finsight::store::{merge_tags, InMemoryStore, TagStore};
use finsight::tagging::TagGenerator;

/// Answers every structured request with the same tag list.
struct CannedTags(Vec<String>);

#[async_trait]
impl LlmClient for CannedTags {
    async fn complete_json(&self, _request: JsonRequest) -> Result<Value> {
        Ok(json!({ "tags": self.0 }))
    }

    async fn complete_text(&self, _request: TextRequest) -> Result<String> {
        Ok(String::new())
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn tag() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Apple".to_string()),
        Just("apple".to_string()),
        Just("Tesla".to_string()),
        Just("Interest  Rates".to_string()),
        Just("interest rates".to_string()),
        Just("Bonds".to_string()),
        Just(" ".to_string()),
        "[A-Za-z ]{1,12}",
    ]
}

fn resolve_case(
    vocabulary: Vec<String>,
    answer: Vec<String>,
    exact: bool,
) -> (Vec<String>, Vec<String>) {
    runtime().block_on(async {
        let store = Arc::new(InMemoryStore::new());
        let vocab = store.merge(TagCategory::Audio, &vocabulary).await.unwrap();
        let tagger = TagGenerator::new(Arc::new(CannedTags(answer)), store);
        let resolved = if exact {
            tagger.resolve_exact("what is happening in markets", TagCategory::Audio).await
        } else {
            tagger.resolve_fuzzy("what is happening in markets", TagCategory::Audio).await
        };
        (vocab, resolved.unwrap())
    })
}

proptest! {
    #[test]
    fn merge_is_sorted_union_and_repeat_safe(
        a in prop::collection::vec(tag(), 0..8),
        b in prop::collection::vec(tag(), 0..8),
    ) {
        let merged = merge_tags(a.clone(), b.clone());
        let expected: Vec<String> = a
            .iter()
            .chain(b.iter())
            .filter(|t| !t.trim().is_empty())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        prop_assert_eq!(&merged, &expected);
        prop_assert_eq!(merge_tags(merged.clone(), b), merged);
    }

    #[test]
    fn exact_resolution_stays_inside_vocabulary(
        vocabulary in prop::collection::vec(tag(), 1..8),
        answer in prop::collection::vec(tag(), 0..10),
    ) {
        let (vocab, resolved) = resolve_case(vocabulary, answer, true);
        let vocab: HashSet<&String> = vocab.iter().collect();
        prop_assert!(resolved.iter().all(|t| vocab.contains(t)));
    }

    #[test]
    fn fuzzy_resolution_stays_inside_vocabulary(
        vocabulary in prop::collection::vec(tag(), 1..8),
        answer in prop::collection::vec(tag(), 0..10),
    ) {
        let (vocab, resolved) = resolve_case(vocabulary, answer, false);
        let vocab: HashSet<&String> = vocab.iter().collect();
        prop_assert!(resolved.iter().all(|t| vocab.contains(t)));
        let unique: HashSet<&String> = resolved.iter().collect();
        prop_assert_eq!(unique.len(), resolved.len());
    }

    #[test]
    fn retrieval_is_deduplicated_and_bounded(
        docs in prop::collection::vec((0usize..6, prop::bool::ANY), 0..20),
        limit in 1usize..8,
    ) {
        let results = runtime().block_on(async {
            let store = Arc::new(InMemoryStore::new());
            let retriever = Retriever::new(Arc::new(KeywordEmbedder::new()), store, 4, "no transcription");

            let documents: Vec<ContentDocument> = docs
                .iter()
                .enumerate()
                .map(|(i, (url, no_url))| {
                    let mut doc = ContentDocument::new(format!("Apple note {}", i), SourceType::News);
                    if !*no_url {
                        doc.source_url = format!("https://news/{}", url);
                    }
                    doc
                })
                .collect();
            retriever.store(documents, SourceType::News).await.unwrap();

            let options = RetrieveOptions { limit, tags: None, source_type: SourceType::News };
            retriever.retrieve("Apple", &options).await.unwrap()
        });

        prop_assert!(results.len() <= limit);
        let mut seen = HashSet::new();
        for doc in &results {
            if !doc.source_url.is_empty() {
                prop_assert!(seen.insert(doc.source_url.clone()));
            }
        }
    }
}
