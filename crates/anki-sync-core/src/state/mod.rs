//! Digest stores and the generic reconciliation loop.
//!
//! A digest is the last known synchronized form of a remote object. Each
//! pass computes fresh digests from the vault, diffs them against the stored
//! ones, and lets a [`Reconcile`] strategy replay the differences. Whatever
//! the strategy reports as committed becomes the new stored digest, so parts
//! that failed remotely stay stale and are retried on the next pass.

pub mod note;
pub mod note_type;

use crate::error::SyncError;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::collections::btree_map;
use std::fmt::Display;
use tracing::debug;

/// Ordered map from remote identity to digest.
///
/// Serialized as a JSON object; integer identities become string keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize + Ord, D: Serialize",
    deserialize = "K: DeserializeOwned + Ord, D: DeserializeOwned"
))]
#[serde(transparent)]
pub struct DigestMap<K, D>(BTreeMap<K, D>);

impl<K: Ord, D> Default for DigestMap<K, D> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<K: Ord, D> DigestMap<K, D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<&D> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: K, digest: D) -> Option<D> {
        self.0.insert(key, digest)
    }

    pub fn remove(&mut self, key: &K) -> Option<D> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> btree_map::Keys<'_, K, D> {
        self.0.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, K, D> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear()
    }
}

impl<K: Ord, D> FromIterator<(K, D)> for DigestMap<K, D> {
    fn from_iter<I: IntoIterator<Item = (K, D)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The set of differences between a stored digest and a fresh one.
pub trait ChangeSet {
    fn is_empty(&self) -> bool;
}

/// Result of replaying a change set.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied<D> {
    /// Digest to store: the fresh value for every part that was pushed, the
    /// old value for every part that failed
    pub committed: D,
    /// Messages for the parts that failed
    pub failures: Vec<String>,
}

impl<D> Applied<D> {
    pub fn complete(committed: D) -> Self {
        Self {
            committed,
            failures: Vec::new(),
        }
    }
}

/// Strategy for synchronizing one kind of remote object.
///
/// `apply` and `retire` return `Err` only for failures that must abort the
/// whole pass (unreachable remote, local I/O); everything else is reported
/// through [`Applied::failures`].
#[async_trait]
pub trait Reconcile: Send + Sync {
    type Key: Ord + Clone + Display + Send + Sync;
    type Digest: Clone + PartialEq + Send + Sync;
    type Item: Send + Sync;
    type Changes: ChangeSet + Send;

    fn fingerprint(&self, item: &Self::Item) -> Self::Digest;

    fn diff(&self, old: Option<&Self::Digest>, new: &Self::Digest) -> Self::Changes;

    async fn apply(
        &self,
        key: &Self::Key,
        item: &Self::Item,
        old: Option<&Self::Digest>,
        new: &Self::Digest,
        changes: Self::Changes,
    ) -> Result<Applied<Self::Digest>, SyncError>;

    /// Called for stored identities that are absent from the pass, before
    /// their digest is dropped.
    async fn retire(&self, key: &Self::Key, old: &Self::Digest) -> Result<(), SyncError>;
}

/// What a reconciliation run did, by identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport<K> {
    /// Identities whose changes were all pushed
    pub applied: Vec<K>,
    /// Identities recorded for the first time without any remote call
    pub adopted: Vec<K>,
    pub unchanged: Vec<K>,
    /// Identities whose digest was dropped
    pub retired: Vec<K>,
    /// Absent identities whose digest was kept because they are still claimed
    pub held: Vec<K>,
    /// Identities with at least one failed part, with the failure messages
    pub failed: Vec<(K, Vec<String>)>,
}

impl<K> Default for ReconcileReport<K> {
    fn default() -> Self {
        Self {
            applied: Vec::new(),
            adopted: Vec::new(),
            unchanged: Vec::new(),
            retired: Vec::new(),
            held: Vec::new(),
            failed: Vec::new(),
        }
    }
}

/// Bring `digests` in line with `fresh` through `strategy`.
///
/// On `Err` the map holds every digest committed before the failure.
pub async fn reconcile<R: Reconcile>(
    digests: &mut DigestMap<R::Key, R::Digest>,
    strategy: &R,
    fresh: &BTreeMap<R::Key, R::Item>,
) -> Result<ReconcileReport<R::Key>, SyncError> {
    reconcile_retaining(digests, strategy, fresh, &BTreeSet::new()).await
}

/// [`reconcile`], except that identities in `claimed` are not retired when
/// absent from `fresh`. Their stored digest is left as is.
pub async fn reconcile_retaining<R: Reconcile>(
    digests: &mut DigestMap<R::Key, R::Digest>,
    strategy: &R,
    fresh: &BTreeMap<R::Key, R::Item>,
    claimed: &BTreeSet<R::Key>,
) -> Result<ReconcileReport<R::Key>, SyncError> {
    let mut report = ReconcileReport::default();

    for (key, item) in fresh {
        let new = strategy.fingerprint(item);
        let old = digests.get(key).cloned();
        let changes = strategy.diff(old.as_ref(), &new);

        if changes.is_empty() {
            match old {
                None => report.adopted.push(key.clone()),
                Some(_) => report.unchanged.push(key.clone()),
            }
            digests.insert(key.clone(), new);
            continue;
        }

        let applied = strategy
            .apply(key, item, old.as_ref(), &new, changes)
            .await?;
        if applied.failures.is_empty() {
            report.applied.push(key.clone());
        } else {
            report.failed.push((key.clone(), applied.failures));
        }
        digests.insert(key.clone(), applied.committed);
    }

    let vanished: Vec<R::Key> = digests
        .keys()
        .filter(|key| !fresh.contains_key(key))
        .cloned()
        .collect();
    for key in vanished {
        if claimed.contains(&key) {
            debug!("Keeping {} for an unreadable source", key);
            report.held.push(key);
            continue;
        }
        if let Some(old) = digests.get(&key) {
            strategy.retire(&key, old).await?;
        }
        digests.remove(&key);
        debug!("Forgot {}", key);
        report.retired.push(key);
    }

    Ok(report)
}
