//! Catalog metadata: series, seasons, playable media and their links.
//!
//! This module provides the structures the acquisition pipeline works on,
//! plus the resolver fetching them from the catalog API.
mod resolver;
mod wire_types;

pub use resolver::CatalogResolver;

use crate::locator::MediaRef;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::transport::TransportError;

/// Errors that can occur while resolving catalog metadata.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The series lookup exhausted its retries or returned no payload
    #[error("Series not found: {0}")]
    SeriesNotFound(String),

    /// The video lookup returned no payload
    #[error("Video not found: {0}")]
    MediaNotFound(String),

    /// A single-shot lookup answered with something other than 200
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// The request itself failed
    #[error("Request failed: {0}")]
    Transport(#[from] TransportError),

    /// Failed to parse the API's JSON response
    #[error("Failed to parse API response from {url}: {reason}")]
    Parse { url: String, reason: String },

    /// The API returned data of an unexpected shape
    #[error("API returned invalid data: {0}")]
    InvalidData(String),
}

/// A season of a series: its number and its episodes in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Season {
    pub number: u32,
    pub episodes: Vec<MediaRef>,
}

/// Metadata of a complete series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecord {
    pub title: String,
    pub seasons: Vec<Season>,
}

/// Stream quality levels published by the CDN.
///
/// Declared best to worst; the order callers actually try them in is the
/// priority list they pass to the link selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QualityTier {
    Ozez,
    Stz,
    Tsz,
}

impl QualityTier {
    pub const ALL: [QualityTier; 3] = [QualityTier::Ozez, QualityTier::Stz, QualityTier::Tsz];

    /// The key used for this tier in the API payload
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Ozez => "ozez",
            QualityTier::Stz => "stz",
            QualityTier::Tsz => "tsz",
        }
    }

    /// Best first, worst last
    pub fn default_priority() -> Vec<QualityTier> {
        Self::ALL.to_vec()
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for quality names outside [`QualityTier::ALL`]
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown quality \"{0}\" (expected one of: ozez, stz, tsz)")]
pub struct UnknownQualityTier(pub String);

impl FromStr for QualityTier {
    type Err = UnknownQualityTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownQualityTier(s.to_string()))
    }
}

/// Video URLs of a media item, keyed by required identity, then by quality.
///
/// The table is a sparse matrix: neither the identities nor the tiers present
/// are known in advance, and a tier missing under an identity is normal.
/// Identity keys are stored exactly as published, placeholders included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkTable {
    entries: BTreeMap<String, BTreeMap<QualityTier, String>>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the URL for an (identity, tier) pair, replacing a previous one.
    pub fn insert(
        &mut self,
        identity: impl Into<String>,
        tier: QualityTier,
        url: impl Into<String>,
    ) -> Option<String> {
        self.entries
            .entry(identity.into())
            .or_default()
            .insert(tier, url.into())
    }

    pub fn get(&self, identity: &str, tier: QualityTier) -> Option<&str> {
        self.entries
            .get(identity)
            .and_then(|tiers| tiers.get(&tier))
            .map(String::as_str)
    }

    /// Iterates identities with the tiers published under each
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<QualityTier, String>)> {
        self.entries
            .iter()
            .map(|(identity, tiers)| (identity.as_str(), tiers))
    }

    /// Number of (identity, tier) pairs
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Subtitle language variants offered by the catalog.
///
/// `Other` carries keys outside the known set verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LanguageKey {
    EnglishSub,
    RomajiSub,
    HiraganaSub,
    JapaneseSub,
    Other(String),
}

impl LanguageKey {
    /// All known language keys in their default download order
    pub fn all() -> Vec<LanguageKey> {
        vec![
            LanguageKey::EnglishSub,
            LanguageKey::RomajiSub,
            LanguageKey::HiraganaSub,
            LanguageKey::JapaneseSub,
        ]
    }

    /// The key used in the API payload
    pub fn as_key(&self) -> &str {
        match self {
            LanguageKey::EnglishSub => "englishSub",
            LanguageKey::RomajiSub => "romajiSub",
            LanguageKey::HiraganaSub => "hiraganaSub",
            LanguageKey::JapaneseSub => "japaneseSub",
            LanguageKey::Other(key) => key,
        }
    }

    /// Short code used in subtitle file names; unknown keys pass through.
    pub fn file_code(&self) -> &str {
        match self {
            LanguageKey::EnglishSub => "en",
            LanguageKey::RomajiSub => "ja",
            LanguageKey::JapaneseSub => "jp",
            LanguageKey::HiraganaSub => "hiragana",
            LanguageKey::Other(key) => key,
        }
    }
}

impl From<&str> for LanguageKey {
    fn from(key: &str) -> Self {
        Self::all()
            .into_iter()
            .find(|known| known.as_key() == key)
            .unwrap_or_else(|| LanguageKey::Other(key.to_string()))
    }
}

impl fmt::Display for LanguageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

/// One subtitle track: language variants of the same cues, still encrypted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtitleChannel {
    variants: BTreeMap<String, String>,
}

impl SubtitleChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &LanguageKey, ciphertext: impl Into<String>) {
        self.variants
            .insert(key.as_key().to_string(), ciphertext.into());
    }

    /// The encrypted payload for `key`, if this channel carries it
    pub fn get(&self, key: &LanguageKey) -> Option<&str> {
        self.variants.get(key.as_key()).map(String::as_str)
    }
}

/// All subtitle channels of a media item, in catalog order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtitleSet {
    pub channels: Vec<SubtitleChannel>,
}

/// Metadata of one playable item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRecord {
    pub title: String,
    pub links: LinkTable,
    pub subtitles: SubtitleSet,
}
