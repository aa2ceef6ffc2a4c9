//! Catalog locators
//!
//! Turns user supplied page URLs such as
//! `https://animelon.com/series/Death%20Note` or
//! `https://animelon.com/video/579b1be6c13aa2a6b28f1364` into typed
//! identifiers.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors for locators that match neither the series nor the video shape
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocatorError {
    /// The locator has no path segment naming its kind
    #[error("Bad URL: \"{0}\"")]
    Malformed(String),

    /// The path names a kind other than `series` or `video`
    #[error("Unknown URL type \"{kind}\" in \"{locator}\"")]
    UnknownKind { kind: String, locator: String },

    /// The kind is known but the key after it is empty
    #[error("No identifier after \"{kind}/\" in \"{locator}\"")]
    MissingKey { kind: String, locator: String },
}

/// Opaque catalog key of a series, as it appears in the series page URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesRef(String);

impl SeriesRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The key exactly as given, possibly percent-encoded
    pub fn raw(&self) -> &str {
        &self.0
    }

    /// The human-readable, percent-decoded slug
    ///
    /// Keys that are not valid percent-encoded UTF-8 are returned unchanged.
    pub fn slug(&self) -> String {
        urlencoding::decode(&self.0)
            .map(Cow::into_owned)
            .unwrap_or_else(|_| self.0.clone())
    }
}

impl fmt::Display for SeriesRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.slug())
    }
}

/// Opaque key of a single video
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaRef(String);

impl MediaRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a locator points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Series(SeriesRef),
    Media(MediaRef),
}

impl Identifier {
    /// Parses a catalog page URL.
    ///
    /// The kind is the first path segment (`series` or `video`), the key is
    /// the last non-empty segment after it. Backslashes are kept verbatim;
    /// the series resolver knows how to deal with them.
    pub fn parse(locator: &str) -> Result<Self, LocatorError> {
        let segments: Vec<&str> = locator.trim().split('/').collect();

        // scheme, empty, host, kind, key...
        let kind = segments
            .get(3)
            .filter(|kind| !kind.is_empty())
            .ok_or_else(|| LocatorError::Malformed(locator.to_string()))?;

        let key = segments[4..]
            .iter()
            .rev()
            .find(|segment| !segment.is_empty())
            .map(|segment| strip_query(segment))
            .filter(|key| !key.is_empty());

        let missing_key = || LocatorError::MissingKey {
            kind: kind.to_string(),
            locator: locator.to_string(),
        };

        match *kind {
            "series" => Ok(Self::Series(SeriesRef::new(key.ok_or_else(missing_key)?))),
            "video" => Ok(Self::Media(MediaRef::new(key.ok_or_else(missing_key)?))),
            other => Err(LocatorError::UnknownKind {
                kind: other.to_string(),
                locator: locator.to_string(),
            }),
        }
    }
}

impl FromStr for Identifier {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Drops a trailing `?query` or `#fragment` from a path segment
fn strip_query(segment: &str) -> &str {
    segment
        .split(['?', '#'])
        .next()
        .unwrap_or(segment)
}
