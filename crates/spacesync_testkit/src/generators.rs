//! Property-based test generators using proptest.

use proptest::prelude::*;
use spacesync_engine::derive_filename;
use spacesync_remote::Document;
use std::collections::BTreeMap;

/// Strategy for document titles, including punctuation and non-ASCII letters.
pub fn title_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9 _.,:!?()&/\\-éüßø]{1,60}").expect("Invalid regex")
}

/// Strategy for storage-format bodies.
pub fn body_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("(<p>[a-zA-Z0-9 .,]{0,40}</p>){0,4}").expect("Invalid regex")
}

/// Strategy for never-synced documents.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    (title_strategy(), body_strategy()).prop_map(|(title, body)| Document::new(title, body))
}

/// Strategy for a batch of documents whose derived filenames are pairwise
/// distinct.
pub fn distinct_documents_strategy(max: usize) -> impl Strategy<Value = Vec<Document>> {
    prop::collection::vec(document_strategy(), 1..=max.max(1)).prop_map(|docs| {
        let mut by_filename = BTreeMap::new();
        for doc in docs {
            by_filename.entry(derive_filename(&doc.title)).or_insert(doc);
        }
        by_filename.into_values().collect()
    })
}
