//! Lazy email enrichment for the navigated record.
//!
//! Each registration id is fetched at most once per session. Results are
//! normalized, deduplicated, and cached even when empty; a failed fetch is
//! cached as an empty list and never retried automatically.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use crate::query::QueryService;

/// Session-scoped email cache keyed by registration id. Never evicts.
#[derive(Debug, Default)]
pub struct EmailCache {
    entries: DashMap<String, Vec<String>>,
}

impl EmailCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Vec<String>> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    /// Store the list for `id`. A racing resolution for the same id simply
    /// overwrites with an equivalent list.
    pub fn insert(&self, id: &str, emails: Vec<String>) {
        self.entries.insert(id.to_string(), emails);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fix common typos in a raw address.
///
/// Trims and lowercases, then repairs truncated `.com` / `.com.br` endings.
/// Returns an empty string when nothing usable is left.
pub fn normalize_email(raw: &str) -> String {
    let s = raw.trim().to_lowercase();

    if let Some(stem) = s.strip_suffix(".c") {
        return format!("{}.com", stem);
    }
    for truncated in [".com.", ".com.b", ".com.r"] {
        if let Some(stem) = s.strip_suffix(truncated) {
            return format!("{}.com.br", stem);
        }
    }
    s.trim_end_matches('.').to_string()
}

/// Normalize candidates, drop empties, and dedupe case-insensitively keeping
/// first-seen order.
pub fn normalize_candidates<I, S>(candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(|c| normalize_email(c.as_ref()))
        .filter(|e| !e.is_empty())
        .filter(|e| seen.insert(e.to_lowercase()))
        .collect()
}

/// Resolves email addresses through the query service, backed by an explicit
/// session cache.
#[derive(Clone)]
pub struct EmailResolver {
    service: Arc<dyn QueryService>,
    cache: Arc<EmailCache>,
}

impl EmailResolver {
    pub fn new(service: Arc<dyn QueryService>, cache: Arc<EmailCache>) -> Self {
        Self { service, cache }
    }

    pub fn cache(&self) -> &Arc<EmailCache> {
        &self.cache
    }

    /// Cached addresses for `id`, fetching on first use. Never fails.
    pub fn resolve(&self, id: &str) -> Vec<String> {
        let id = id.trim();
        if id.is_empty() {
            return Vec::new();
        }
        if let Some(cached) = self.cache.get(id) {
            return cached;
        }

        let emails = match self.service.fetch_emails(id) {
            Ok(candidates) => normalize_candidates(candidates.into_iter().flatten()),
            Err(e) => {
                log::warn!("EmailResolver: lookup for {} failed, caching empty: {}", id, e);
                Vec::new()
            }
        };

        log::debug!("EmailResolver: {} address(es) for {}", emails.len(), id);
        self.cache.insert(id, emails.clone());
        emails
    }
}
