//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the glob matcher and the tag/overwrite semantics of
//! the strategies against simple models.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::cache::{CacheStrategy, GetOptions, GlobPattern, MemoryStrategy, SetOptions};

// == Strategies ==
/// Keys from a small alphabet so operations collide often
fn key_strategy() -> impl Strategy<Value = String> {
    "[ab:]{1,4}"
}

fn tag_strategy() -> impl Strategy<Value = String> {
    prop_oneof![Just("t1".to_string()), Just("t2".to_string()), Just("t3".to_string())]
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: i64, tags: Vec<String> },
    Get { key: String },
    Delete { key: String },
    DeleteByTags { tags: Vec<String> },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), any::<i64>(), prop::collection::vec(tag_strategy(), 0..3))
            .prop_map(|(key, value, tags)| CacheOp::Set { key, value, tags }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
        key_strategy().prop_map(|key| CacheOp::Delete { key }),
        prop::collection::vec(tag_strategy(), 1..3).prop_map(|tags| CacheOp::DeleteByTags { tags }),
    ]
}

/// Reference wildcard matcher: `*` any run, `?` one char.
fn reference_match(pattern: &[char], key: &[char]) -> bool {
    match (pattern.first(), key.first()) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some('*'), _) => {
            reference_match(&pattern[1..], key)
                || (!key.is_empty() && reference_match(pattern, &key[1..]))
        }
        (Some('?'), Some(_)) => reference_match(&pattern[1..], &key[1..]),
        (Some(p), Some(k)) if p == k => reference_match(&pattern[1..], &key[1..]),
        _ => false,
    }
}

/// Model of the contract: key -> (value, tags)
#[derive(Default)]
struct Model {
    entries: BTreeMap<String, (i64, BTreeSet<String>)>,
}

impl Model {
    fn delete_by_tags(&mut self, tags: &[String]) -> usize {
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, (_, entry_tags))| tags.iter().any(|t| entry_tags.contains(t)))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            self.entries.remove(key);
        }
        doomed.len()
    }
}

/// Applies one operation and returns its observable result as JSON.
async fn apply(cache: &dyn CacheStrategy, op: &CacheOp) -> Value {
    match op {
        CacheOp::Set { key, value, tags } => {
            cache
                .set(key, json!(value), SetOptions::new().with_tags(tags.clone()))
                .await
                .unwrap();
            Value::Null
        }
        CacheOp::Get { key } => cache
            .get(key, GetOptions::default())
            .await
            .unwrap()
            .unwrap_or(Value::Null),
        CacheOp::Delete { key } => json!(cache.delete(key).await.unwrap()),
        CacheOp::DeleteByTags { tags } => json!(cache.delete_by_tags(tags).await.unwrap()),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // Glob matching agrees with a direct wildcard matcher
    #[test]
    fn prop_glob_matches_reference(pattern in "[ab.*?]{0,6}", key in "[ab.]{0,6}") {
        let glob = GlobPattern::new(&pattern).unwrap();
        let p: Vec<char> = pattern.chars().collect();
        let k: Vec<char> = key.chars().collect();
        prop_assert_eq!(glob.matches(&key), reference_match(&p, &k));
    }

    // A literal pattern only matches itself
    #[test]
    fn prop_literal_pattern_matches_only_itself(key in "[a-z:._-]{1,16}", other in "[a-z:._-]{1,16}") {
        let glob = GlobPattern::new(&key).unwrap();
        prop_assert!(glob.matches(&key));
        prop_assert_eq!(glob.matches(&other), key == other);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Any operation sequence on the memory strategy matches the model
    #[test]
    fn prop_memory_strategy_matches_model(ops in prop::collection::vec(cache_op_strategy(), 1..40)) {
        let cache = MemoryStrategy::new(None);
        let mut model = Model::default();

        tokio_test::block_on(async {
            for op in &ops {
                let actual = apply(&cache, op).await;
                let expected = match op {
                    CacheOp::Set { key, value, tags } => {
                        model.entries.insert(key.clone(), (*value, tags.iter().cloned().collect()));
                        Value::Null
                    }
                    CacheOp::Get { key } => model
                        .entries
                        .get(key)
                        .map(|(v, _)| json!(v))
                        .unwrap_or(Value::Null),
                    CacheOp::Delete { key } => json!(model.entries.remove(key).is_some()),
                    CacheOp::DeleteByTags { tags } => json!(model.delete_by_tags(tags)),
                };
                assert_eq!(actual, expected, "mismatch on {:?}", op);
            }

            let keys = cache.keys(None).await.unwrap();
            let expected: Vec<String> = model.entries.keys().cloned().collect();
            assert_eq!(keys, expected);
        });
    }
}

#[cfg(feature = "sqlite")]
proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    // SQLite returns exactly what the memory strategy returns
    #[test]
    fn prop_sqlite_matches_memory(ops in prop::collection::vec(cache_op_strategy(), 1..30)) {
        use crate::cache::SqliteStrategy;

        let dir = tempfile::tempdir().unwrap();
        let sqlite = SqliteStrategy::new(Some(dir.path().join("cache.db").as_path()), None);
        let memory = MemoryStrategy::new(None);

        tokio_test::block_on(async {
            for op in &ops {
                let from_memory = apply(&memory, op).await;
                let from_sqlite = apply(&sqlite, op).await;
                assert_eq!(from_sqlite, from_memory, "backends diverged on {:?}", op);
            }
            assert_eq!(sqlite.keys(None).await.unwrap(), memory.keys(None).await.unwrap());
            assert_eq!(sqlite.stats().await.unwrap(), memory.stats().await.unwrap());
            sqlite.close().await.unwrap();
        });
    }
}
