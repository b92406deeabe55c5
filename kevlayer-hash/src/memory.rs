//! In-process [`HashClient`] used for development and tests.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use kevlayer_core::error::DocumentStoreResult;

use crate::client::{HashClient, HashCommand};

#[derive(Debug, Default)]
struct HashState {
    hashes: HashMap<String, BTreeMap<String, String>>,
    sets: HashMap<String, BTreeSet<String>>,
    counters: HashMap<String, i64>,
}

impl HashState {
    fn apply(&mut self, command: HashCommand) {
        match command {
            HashCommand::HSet { key, fields } => {
                self.hashes
                    .entry(key)
                    .or_default()
                    .extend(fields);
            }
            HashCommand::Del { keys } => {
                for key in keys {
                    self.remove(&key);
                }
            }
            HashCommand::SAdd { key, members } => {
                self.sets
                    .entry(key)
                    .or_default()
                    .extend(members);
            }
            HashCommand::SRem { key, members } => {
                if let Some(set) = self.sets.get_mut(&key) {
                    for member in &members {
                        set.remove(member);
                    }
                    if set.is_empty() {
                        self.sets.remove(&key);
                    }
                }
            }
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        let hash = self.hashes.remove(key).is_some();
        let set = self.sets.remove(key).is_some();
        let counter = self.counters.remove(key).is_some();
        hash || set || counter
    }

    fn key_names(&self) -> impl Iterator<Item = &String> {
        self.hashes
            .keys()
            .chain(self.sets.keys())
            .chain(self.counters.keys())
    }
}

/// A hash-table store held in process memory.
///
/// Cloning shares the underlying data. Pipelines are applied under a single
/// write lock, so a batch is never observed half-applied.
#[derive(Debug, Clone, Default)]
pub struct MemoryHashClient {
    state: Arc<RwLock<HashState>>,
}

impl MemoryHashClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub async fn key_count(&self) -> usize {
        self.state.read().await.key_names().count()
    }
}

#[async_trait]
impl HashClient for MemoryHashClient {
    async fn hset(&self, key: &str, fields: Vec<(String, String)>) -> DocumentStoreResult<()> {
        self.state.write().await.apply(HashCommand::HSet {
            key: key.to_string(),
            fields,
        });
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> DocumentStoreResult<BTreeMap<String, String>> {
        Ok(self
            .state
            .read()
            .await
            .hashes
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn del(&self, keys: &[String]) -> DocumentStoreResult<usize> {
        let mut state = self.state.write().await;
        Ok(keys
            .iter()
            .filter(|key| state.remove(key))
            .count())
    }

    async fn sadd(&self, key: &str, members: &[String]) -> DocumentStoreResult<()> {
        self.state.write().await.apply(HashCommand::SAdd {
            key: key.to_string(),
            members: members.to_vec(),
        });
        Ok(())
    }

    async fn srem(&self, key: &str, members: &[String]) -> DocumentStoreResult<()> {
        self.state.write().await.apply(HashCommand::SRem {
            key: key.to_string(),
            members: members.to_vec(),
        });
        Ok(())
    }

    async fn smembers(&self, key: &str) -> DocumentStoreResult<Vec<String>> {
        Ok(self
            .state
            .read()
            .await
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn sinter(&self, keys: &[String]) -> DocumentStoreResult<Vec<String>> {
        let state = self.state.read().await;
        let empty = BTreeSet::new();
        let mut sets = keys
            .iter()
            .map(|key| state.sets.get(key).unwrap_or(&empty));

        let Some(first) = sets.next() else {
            return Ok(Vec::new());
        };

        let mut members: BTreeSet<String> = first.clone();
        for set in sets {
            members.retain(|member| set.contains(member));
        }
        Ok(members.into_iter().collect())
    }

    async fn keys(&self, pattern: &str) -> DocumentStoreResult<Vec<String>> {
        let state = self.state.read().await;
        let mut keys: Vec<String> = state
            .key_names()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn incr(&self, key: &str) -> DocumentStoreResult<i64> {
        let mut state = self.state.write().await;
        let counter = state
            .counters
            .entry(key.to_string())
            .or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn pipeline(&self, commands: Vec<HashCommand>) -> DocumentStoreResult<()> {
        let mut state = self.state.write().await;
        for command in commands {
            state.apply(command);
        }
        Ok(())
    }
}

/// Matches `text` against a glob pattern supporting `*` and `?`.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some('?') => {
                p += 1;
                t += 1;
            }
            Some(c) if *c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}
