//! Domain list sources
//!
//! Reads blocklist and allowlist files in hosts, adblock, or plain format
//! and produces the ordered domain set handed to the partitioner.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info};

use crate::error::Result;

/// Addresses hosts files point blocked names at
const HOSTS_ADDRESSES: [&str; 4] = ["0.0.0.0", "127.0.0.1", "::1", "::"];

/// Strip list syntax from one entry, leaving the bare domain
///
/// ```rust
/// use gatesync_core::source::normalize_domain;
///
/// assert_eq!(normalize_domain("0.0.0.0 ads.example.com", false), "ads.example.com");
/// assert_eq!(normalize_domain("||tracker.example^", false), "tracker.example");
/// assert_eq!(normalize_domain("@@||good.example^", true), "good.example");
/// ```
pub fn normalize_domain(line: &str, allowlisting: bool) -> String {
    let mut value = line.trim();

    if allowlisting {
        value = value.strip_prefix("@@||").unwrap_or(value);
    }

    if let Some((address, rest)) = value.split_once(char::is_whitespace)
        && HOSTS_ADDRESSES.contains(&address)
    {
        value = rest.trim_start();
    }

    let value = value.strip_prefix("||").unwrap_or(value);
    let value = value
        .strip_suffix("^$important")
        .or_else(|| value.strip_suffix('^'))
        .unwrap_or(value);
    let value = value.strip_prefix("*.").unwrap_or(value);

    value.trim().to_string()
}

/// Parse a list file into normalized domains, in file order
///
/// Blank lines and comment lines (`#`, `!`) are skipped, as are entries that
/// normalize to nothing. Duplicates are kept.
pub fn parse_domain_list(text: &str, allowlisting: bool) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .map(|line| normalize_domain(line, allowlisting))
        .filter(|domain| !domain.is_empty())
        .collect()
}

/// The deduplicated, allowlist-filtered domains to upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainSet {
    /// Domains in first-occurrence order
    pub domains: Vec<String>,
    /// Entries dropped because they were allowlisted
    pub allowlisted: usize,
    /// Entries dropped as repeats
    pub duplicates: usize,
}

impl DomainSet {
    /// Build a set from list file contents
    pub fn from_lists(blocklist: &str, allowlist: Option<&str>) -> Self {
        let allowed: HashSet<String> = allowlist
            .map(|text| parse_domain_list(text, true).into_iter().collect())
            .unwrap_or_default();

        let mut seen = HashSet::new();
        let mut set = DomainSet::default();

        for domain in parse_domain_list(blocklist, false) {
            if allowed.contains(&domain) {
                set.allowlisted += 1;
            } else if seen.insert(domain.clone()) {
                set.domains.push(domain);
            } else {
                set.duplicates += 1;
            }
        }

        set
    }

    /// Read the blocklist and optional allowlist files
    ///
    /// A missing allowlist file is treated as empty.
    ///
    /// # Errors
    ///
    /// [`Error::Io`](crate::Error::Io) when the blocklist (or an existing
    /// allowlist) cannot be read.
    pub async fn load(blocklist: &Path, allowlist: Option<&Path>) -> Result<Self> {
        let blocked = tokio::fs::read_to_string(blocklist).await?;

        let allowed = match allowlist {
            Some(path) => match tokio::fs::read_to_string(path).await {
                Ok(text) => Some(text),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Allowlist {} not found, skipping", path.display());
                    None
                }
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        let set = Self::from_lists(&blocked, allowed.as_deref());
        info!(
            "Loaded {} domains from {} ({} allowlisted, {} duplicates removed)",
            set.len(),
            blocklist.display(),
            set.allowlisted,
            set.duplicates
        );
        Ok(set)
    }

    /// Number of domains
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}
