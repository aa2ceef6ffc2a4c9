//! Runtime configuration of the acquisition pipeline

use crate::catalog::{LanguageKey, QualityTier};
use std::path::PathBuf;
use std::time::Duration;

/// Catalog base URL; API paths are appended to it
pub const DEFAULT_BASE_URL: &str = "https://animelon.com/";

/// Identity presented on catalog requests and on video requests that do not
/// carry a link-specific identity
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.107 Safari/537.36";

/// Settings shared by every acquisition task
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionConfig {
    /// Catalog base URL, with trailing slash
    pub base_url: String,
    /// Default identity token
    pub user_agent: String,
    /// Directory all output paths are relative to
    pub output_root: PathBuf,
    /// Upper bound of simultaneously running tasks
    pub max_concurrent: usize,
    /// Attempts for series lookups and for each media pipeline
    pub max_tries: u32,
    /// Pause between task launches; also the backoff unit for media retries
    pub sleep_time: Duration,
    /// Pause between series lookup attempts
    pub retry_sleep: Duration,
    /// Subtitle variants to keep, in save order. Empty disables subtitles.
    pub subtitle_languages: Vec<LanguageKey>,
    /// Quality tiers to try, best first
    pub quality_priority: Vec<QualityTier>,
    /// Save subtitles without downloading videos
    pub subtitles_only: bool,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            output_root: PathBuf::from("."),
            max_concurrent: 1,
            max_tries: 5,
            sleep_time: Duration::from_secs(5),
            retry_sleep: Duration::from_secs(5),
            subtitle_languages: LanguageKey::all(),
            quality_priority: QualityTier::default_priority(),
            subtitles_only: false,
        }
    }
}

impl AcquisitionConfig {
    /// The base URL with exactly one trailing slash
    pub fn normalized_base_url(&self) -> String {
        format!("{}/", self.base_url.trim_end_matches('/'))
    }
}
