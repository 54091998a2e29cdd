//! Known OSA development builds.
//!
//! The list of development builds (IC-root sub-versions) that the data
//! server can actually run lives in a knowledge-base service. Asking it on
//! every request is slow, so the answer is kept in an external key-value
//! cache for ten minutes. The cache is best-effort: if it misbehaves we log
//! and go back to the knowledge base.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use crate::error::{OsaError, Result};

/// One result row of a knowledge-base selection, keyed by variable name.
pub type Row = BTreeMap<String, String>;

pub const DEV_VERSIONS_QUERY: &str = "oda:osa_version oda:osa_option ?vs";
pub const DEV_VERSIONS_CACHE_KEY: &str = "cdci_osa_plugin.dev_versions";
pub const DEV_VERSIONS_TTL: Duration = Duration::from_secs(600);

pub trait KnowledgeBase {
    /// Run a selection; each row maps variable names (without `?`) to values.
    fn select(&self, query: &str) -> anyhow::Result<Vec<Row>>;
}

/// An external key-value store with expiring entries.
pub trait Cache {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()>;
}

pub trait VersionRegistry {
    fn known_dev_versions(&self) -> Result<Vec<String>>;
}

/// A fixed list, for tests and offline tools.
#[derive(Clone, Debug, Default)]
pub struct StaticVersionRegistry {
    versions: Vec<String>,
}

impl StaticVersionRegistry {
    pub fn new<I, S>(versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StaticVersionRegistry {
            versions: versions.into_iter().map(Into::into).collect(),
        }
    }
}

impl VersionRegistry for StaticVersionRegistry {
    fn known_dev_versions(&self) -> Result<Vec<String>> {
        Ok(self.versions.clone())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory cache lock poisoned"))?;

        match entries.get(key) {
            Some((expires, value)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory cache lock poisoned"))?;
        entries.insert(key.to_owned(), (Instant::now() + ttl, value.to_owned()));
        Ok(())
    }
}

/// The production registry: knowledge base behind a TTL cache.
pub struct CachedVersionRegistry<K, C> {
    kb: K,
    cache: C,
    ttl: Duration,
}

impl<K: KnowledgeBase, C: Cache> CachedVersionRegistry<K, C> {
    pub fn new(kb: K, cache: C) -> Self {
        CachedVersionRegistry {
            kb,
            cache,
            ttl: DEV_VERSIONS_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn cached(&self) -> Option<Vec<String>> {
        let text = match self.cache.get(DEV_VERSIONS_CACHE_KEY) {
            Ok(Some(t)) => t,
            Ok(None) => return None,
            Err(e) => {
                warn!("failed to read dev versions from cache: {e:#}");
                return None;
            }
        };

        match serde_json::from_str(&text) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("discarding unparseable cached dev versions: {e}");
                None
            }
        }
    }

    fn fetch(&self) -> Result<Vec<String>> {
        let rows = self.kb.select(DEV_VERSIONS_QUERY).map_err(|e| OsaError::Unknown {
            message: "failed to fetch known OSA versions".to_owned(),
            debug_message: format!("{e:#}"),
        })?;

        let versions: Vec<String> = rows.into_iter().filter_map(|mut r| r.remove("vs")).collect();
        debug!("knowledge base lists {} OSA dev versions", versions.len());
        Ok(versions)
    }
}

impl<K: KnowledgeBase, C: Cache> VersionRegistry for CachedVersionRegistry<K, C> {
    fn known_dev_versions(&self) -> Result<Vec<String>> {
        if let Some(v) = self.cached() {
            return Ok(v);
        }

        let versions = self.fetch()?;

        match serde_json::to_string(&versions) {
            Ok(text) => {
                if let Err(e) = self.cache.set(DEV_VERSIONS_CACHE_KEY, &text, self.ttl) {
                    warn!("failed to store dev versions in cache: {e:#}");
                }
            }
            Err(e) => warn!("failed to serialize dev versions: {e}"),
        }

        Ok(versions)
    }
}
