/// Catalog API response types for deserialization.
///
/// These structures mirror the JSON the catalog returns. The media payload
/// is loosely shaped, so the link and subtitle maps are read as raw JSON
/// values and filtered when converting.
use super::{
    CatalogError, CatalogRecord, LanguageKey, LinkTable, MediaRecord, QualityTier, Season,
    SubtitleChannel, SubtitleSet,
};
use crate::locator::MediaRef;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Every API response wraps its payload in `resObj`, which is null on a miss.
#[derive(Debug, Deserialize)]
pub(super) struct ApiEnvelope<T> {
    #[serde(rename = "resObj")]
    pub res_obj: Option<T>,
}

/// Payload of `api/series/<slug>`
#[derive(Debug, Deserialize)]
pub(super) struct WireSeries {
    /// The series title doubles as its id
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub seasons: Vec<WireSeason>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireSeason {
    /// Either a JSON number or a numeric string
    pub number: WireNumber,
    #[serde(default)]
    pub episodes: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum WireNumber {
    Int(u32),
    Text(String),
}

/// Payload of `api/languagevideo/findByVideo`
#[derive(Debug, Deserialize)]
pub(super) struct WireMedia {
    pub title: String,
    #[serde(default)]
    pub video: Option<WireVideo>,
    /// May be null as well as missing
    #[serde(default)]
    pub subtitles: Option<Vec<WireSubtitle>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireVideo {
    /// identity -> { "videoURLs": { tier -> url } }
    #[serde(rename = "videoURLsData", default)]
    pub video_urls_data: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireSubtitle {
    /// language key -> ciphertext
    #[serde(default)]
    pub content: BTreeMap<String, Value>,
}

impl WireSeries {
    pub fn into_record(self) -> Result<CatalogRecord, CatalogError> {
        let seasons = self
            .seasons
            .into_iter()
            .map(|season| {
                Ok(Season {
                    number: season.number.as_u32()?,
                    episodes: season.episodes.into_iter().map(MediaRef::new).collect(),
                })
            })
            .collect::<Result<Vec<_>, CatalogError>>()?;

        Ok(CatalogRecord {
            title: self.id,
            seasons,
        })
    }
}

impl WireNumber {
    fn as_u32(&self) -> Result<u32, CatalogError> {
        match self {
            WireNumber::Int(number) => Ok(*number),
            WireNumber::Text(text) => text.trim().parse().map_err(|_| {
                CatalogError::InvalidData(format!("season number \"{text}\" is not numeric"))
            }),
        }
    }
}

impl WireMedia {
    pub fn into_record(self) -> MediaRecord {
        let mut links = LinkTable::new();

        let identities = self
            .video
            .map(|video| video.video_urls_data)
            .unwrap_or_default();

        for (identity, entry) in identities {
            let Some(urls) = entry.get("videoURLs").and_then(Value::as_object) else {
                debug!(%identity, "identity without videoURLs, skipping");
                continue;
            };
            for (tier_name, url) in urls {
                match (tier_name.parse::<QualityTier>(), url.as_str()) {
                    (Ok(tier), Some(url)) => {
                        links.insert(identity.clone(), tier, url);
                    }
                    _ => debug!(%identity, tier = %tier_name, "ignoring unusable link entry"),
                }
            }
        }

        let channels = self
            .subtitles
            .unwrap_or_default()
            .into_iter()
            .map(|subtitle| {
                let mut channel = SubtitleChannel::new();
                for (key, payload) in subtitle.content {
                    if let Some(ciphertext) = payload.as_str() {
                        channel.insert(&LanguageKey::from(key.as_str()), ciphertext);
                    }
                }
                channel
            })
            .collect();

        MediaRecord {
            title: self.title,
            links,
            subtitles: SubtitleSet { channels },
        }
    }
}
