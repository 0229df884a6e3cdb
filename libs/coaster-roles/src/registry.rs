//! Transient side table for annotations recorded before their class exists.
//!
//! Annotating an attribute stamps a generated [`AnnotationToken`] on its
//! descriptor and records the fact here under that token. When the owning
//! class is finalized its sweep drains the entries it claims. Descriptors
//! that are sealed cannot carry a token, so their facts are recorded under
//! the attribute name instead and are claimed by the first class that sweeps
//! that name.
//!
//! Entries left behind (a class abandoned half way through its definition)
//! are discarded by [`AnnotationRegistry::purge`], which should run once all
//! classes are configured.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::annotations::AnnotationFact;

static GLOBAL: LazyLock<AnnotationRegistry> = LazyLock::new(AnnotationRegistry::new);

/// Opaque handle stamped on an attribute descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotationToken(u64);

impl fmt::Display for AnnotationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AnnotationKey {
    Token(AnnotationToken),
    /// Fallback for sealed descriptors.
    Name(String),
}

impl fmt::Display for AnnotationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(token) => token.fmt(f),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Pending annotation facts keyed by attribute.
///
/// Class definition is expected to run single-threaded at startup; the
/// internal lock only keeps the table consistent, it does not order
/// concurrent definitions.
#[derive(Debug)]
pub struct AnnotationRegistry {
    next_token: AtomicU64,
    pending: Mutex<HashMap<AnnotationKey, Vec<AnnotationFact>>>,
}

impl Default for AnnotationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_token: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Process-wide registry.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    #[must_use]
    pub fn issue_token(&self) -> AnnotationToken {
        AnnotationToken(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    /// Record a fact. Facts for the same key accumulate.
    pub fn record(&self, key: AnnotationKey, fact: AnnotationFact) {
        self.pending.lock().entry(key).or_default().push(fact);
    }

    /// Remove and return every fact recorded under `key`.
    #[must_use]
    pub fn drain(&self, key: &AnnotationKey) -> Option<Vec<AnnotationFact>> {
        self.pending.lock().remove(key)
    }

    #[must_use]
    pub fn contains(&self, key: &AnnotationKey) -> bool {
        self.pending.lock().contains_key(key)
    }

    /// Number of keys still waiting to be claimed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Discard every unclaimed entry and return how many were dropped.
    pub fn purge(&self) -> usize {
        let leftovers: Vec<(AnnotationKey, Vec<AnnotationFact>)> =
            self.pending.lock().drain().collect();
        for (key, facts) in &leftovers {
            tracing::warn!(
                key = %key,
                facts = facts.len(),
                "Discarding annotation never claimed by a class"
            );
        }
        leftovers.len()
    }
}
