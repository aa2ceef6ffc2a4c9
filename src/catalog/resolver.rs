/// Catalog API resolver.
use super::wire_types::{ApiEnvelope, WireMedia, WireSeries};
use super::{CatalogError, CatalogRecord, MediaRecord};
use crate::config::AcquisitionConfig;
use crate::locator::{MediaRef, SeriesRef};
use crate::transport::Transport;
use serde::de::DeserializeOwned;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Resolves series and media identifiers into metadata records.
///
/// The resolver is stateless between calls; it only borrows a transport.
pub struct CatalogResolver<'a> {
    transport: &'a dyn Transport,
    base_url: String,
    max_tries: u32,
    retry_sleep: Duration,
}

impl<'a> CatalogResolver<'a> {
    /// Creates a resolver against `base_url` (with trailing slash).
    pub fn new(
        transport: &'a dyn Transport,
        base_url: impl Into<String>,
        max_tries: u32,
        retry_sleep: Duration,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            max_tries: max_tries.max(1),
            retry_sleep,
        }
    }

    pub fn from_config(transport: &'a dyn Transport, config: &AcquisitionConfig) -> Self {
        Self::new(
            transport,
            config.normalized_base_url(),
            config.max_tries,
            config.retry_sleep,
        )
    }

    /// URL of the series lookup for a decoded slug
    pub fn series_api_url(&self, slug: &str) -> String {
        format!("{}api/series/{}", self.base_url, urlencoding::encode(slug))
    }

    /// URL of the media lookup for a video id
    pub fn media_api_url(&self, media: &MediaRef) -> String {
        format!(
            "{}api/languagevideo/findByVideo?videoId={}&learnerLanguage=en&subs=1&cdnLink=1&viewCounter=1",
            self.base_url,
            urlencoding::encode(media.id())
        )
    }

    /// Fetches the season and episode list of a series.
    ///
    /// Non-200 answers are retried up to `max_tries` times. Some series slugs
    /// reach us with a stray backslash; when such a slug resolves to an empty
    /// payload, the lookup is repeated exactly once without backslashes.
    pub fn resolve_series(&self, series: &SeriesRef) -> Result<CatalogRecord, CatalogError> {
        let slug = series.slug();

        match self.fetch_series(&slug)? {
            Some(record) => Ok(record),
            None if slug.contains('\\') => {
                let stripped = slug.replace('\\', "");
                debug!(%slug, %stripped, "empty series payload, retrying without backslashes");
                self.fetch_series(&stripped)?
                    .ok_or(CatalogError::SeriesNotFound(stripped))
            }
            None => Err(CatalogError::SeriesNotFound(slug)),
        }
    }

    /// Fetches the metadata of a single video. No retries at this level.
    pub fn resolve_media(&self, media: &MediaRef) -> Result<MediaRecord, CatalogError> {
        let url = self.media_api_url(media);

        let response = self.transport.get(&url, None)?;
        if !response.is_ok() {
            return Err(CatalogError::HttpStatus {
                url,
                status: response.status,
            });
        }

        let body = response.into_text(&url)?;
        let envelope: ApiEnvelope<WireMedia> = parse_envelope(&url, &body)?;

        envelope
            .res_obj
            .map(WireMedia::into_record)
            .ok_or_else(|| CatalogError::MediaNotFound(media.id().to_string()))
    }

    /// One series lookup; `Ok(None)` when the API answered without payload
    fn fetch_series(&self, slug: &str) -> Result<Option<CatalogRecord>, CatalogError> {
        let url = self.series_api_url(slug);
        let body = self.get_with_retries(&url, slug)?;
        let envelope: ApiEnvelope<WireSeries> = parse_envelope(&url, &body)?;

        envelope.res_obj.map(WireSeries::into_record).transpose()
    }

    fn get_with_retries(&self, url: &str, slug: &str) -> Result<String, CatalogError> {
        for attempt in 1..=self.max_tries {
            match self.transport.get(url, None) {
                Ok(response) if response.is_ok() => return Ok(response.into_text(url)?),
                Ok(response) => {
                    warn!(%url, status = response.status, attempt, "series lookup rejected");
                }
                Err(e) => warn!(%url, error = %e, attempt, "series lookup failed"),
            }

            if attempt < self.max_tries {
                thread::sleep(self.retry_sleep);
            }
        }

        Err(CatalogError::SeriesNotFound(slug.to_string()))
    }
}

fn parse_envelope<T: DeserializeOwned>(url: &str, body: &str) -> Result<ApiEnvelope<T>, CatalogError> {
    serde_json::from_str(body).map_err(|e| CatalogError::Parse {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{LanguageKey, QualityTier};
    use crate::transport::testing::ScriptedTransport;

    const BASE: &str = "https://animelon.test/";

    const SERIES_BODY: &str = r#"{"resObj": {"_id": "Girls' Last Tour", "seasons": [
        {"number": "1", "episodes": ["e1", "e2"]}
    ]}}"#;

    fn resolver(transport: &ScriptedTransport, max_tries: u32) -> CatalogResolver<'_> {
        CatalogResolver::new(transport, BASE, max_tries, Duration::ZERO)
    }

    #[test]
    fn test_resolve_series_success() {
        let transport = ScriptedTransport::new();
        let resolver = resolver(&transport, 3);
        transport.respond(&resolver.series_api_url("Girls' Last Tour"), 200, SERIES_BODY);

        let record = resolver
            .resolve_series(&SeriesRef::new("Girls'%20Last%20Tour"))
            .unwrap();

        assert_eq!(record.title, "Girls' Last Tour");
        assert_eq!(record.seasons.len(), 1);
        assert_eq!(record.seasons[0].episodes.len(), 2);
    }

    #[test]
    fn test_resolve_series_retries_non_200() {
        let transport = ScriptedTransport::new();
        let resolver = resolver(&transport, 5);
        let url = resolver.series_api_url("Death Note");
        transport
            .respond(&url, 503, "")
            .respond(&url, 403, "")
            .respond(&url, 200, SERIES_BODY);

        let record = resolver.resolve_series(&SeriesRef::new("Death%20Note")).unwrap();

        assert_eq!(record.title, "Girls' Last Tour");
        assert_eq!(transport.call_count(&url), 3);
    }

    #[test]
    fn test_resolve_series_gives_up_after_max_tries() {
        let transport = ScriptedTransport::new();
        let resolver = resolver(&transport, 4);
        let url = resolver.series_api_url("Death Note");
        transport.respond(&url, 500, "");

        let result = resolver.resolve_series(&SeriesRef::new("Death%20Note"));

        assert!(matches!(result, Err(CatalogError::SeriesNotFound(slug)) if slug == "Death Note"));
        assert_eq!(transport.call_count(&url), 4);
    }

    #[test]
    fn test_backslash_slug_is_retried_once_stripped() {
        let transport = ScriptedTransport::new();
        let resolver = resolver(&transport, 2);
        let escaped = resolver.series_api_url(r"Girls\' Last Tour");
        let stripped = resolver.series_api_url("Girls' Last Tour");
        transport
            .respond(&escaped, 200, r#"{"resObj": null}"#)
            .respond(&stripped, 200, SERIES_BODY);

        let record = resolver
            .resolve_series(&SeriesRef::new(r"Girls\'%20Last%20Tour"))
            .unwrap();

        assert_eq!(record.title, "Girls' Last Tour");
        assert_eq!(transport.call_count(&escaped), 1);
        assert_eq!(transport.call_count(&stripped), 1);
        assert_eq!(transport.calls().len(), 2);
    }

    #[test]
    fn test_backslash_retry_does_not_loop() {
        let transport = ScriptedTransport::new();
        let resolver = resolver(&transport, 2);
        let escaped = resolver.series_api_url(r"A\\B");
        let stripped = resolver.series_api_url("AB");
        transport
            .respond(&escaped, 200, r#"{"resObj": null}"#)
            .respond(&stripped, 200, r#"{"resObj": null}"#);

        let result = resolver.resolve_series(&SeriesRef::new(r"A\\B"));

        assert!(matches!(result, Err(CatalogError::SeriesNotFound(slug)) if slug == "AB"));
        assert_eq!(transport.calls().len(), 2);
    }

    #[test]
    fn test_null_payload_without_backslash_is_not_found() {
        let transport = ScriptedTransport::new();
        let resolver = resolver(&transport, 3);
        let url = resolver.series_api_url("Nothing");
        transport.respond(&url, 200, r#"{"resObj": null}"#);

        let result = resolver.resolve_series(&SeriesRef::new("Nothing"));

        assert!(matches!(result, Err(CatalogError::SeriesNotFound(_))));
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_resolve_series_unparseable_body() {
        let transport = ScriptedTransport::new();
        let resolver = resolver(&transport, 1);
        transport.respond(&resolver.series_api_url("X"), 200, "<html>");

        assert!(matches!(
            resolver.resolve_series(&SeriesRef::new("X")),
            Err(CatalogError::Parse { .. })
        ));
    }

    #[test]
    fn test_resolve_media() {
        let transport = ScriptedTransport::new();
        let resolver = resolver(&transport, 1);
        let media = MediaRef::new("5b5412ce33107581e4f672a5");
        let url = resolver.media_api_url(&media);
        assert_eq!(
            url,
            "https://animelon.test/api/languagevideo/findByVideo?videoId=5b5412ce33107581e4f672a5&learnerLanguage=en&subs=1&cdnLink=1&viewCounter=1"
        );
        transport.respond(
            &url,
            200,
            r#"{"resObj": {
                "title": "Episode 3",
                "video": {"videoURLsData": {"agent": {"videoURLs": {"stz": "https://cdn/stz"}}}},
                "subtitles": [{"content": {"englishSub": "cipher"}}]
            }}"#,
        );

        let record = resolver.resolve_media(&media).unwrap();

        assert_eq!(record.title, "Episode 3");
        assert_eq!(record.links.get("agent", QualityTier::Stz), Some("https://cdn/stz"));
        assert_eq!(
            record.subtitles.channels[0].get(&LanguageKey::EnglishSub),
            Some("cipher")
        );
    }

    #[test]
    fn test_resolve_media_is_single_shot() {
        let transport = ScriptedTransport::new();
        let resolver = resolver(&transport, 5);
        let media = MediaRef::new("missing");
        let url = resolver.media_api_url(&media);
        transport.respond(&url, 502, "");

        assert!(matches!(
            resolver.resolve_media(&media),
            Err(CatalogError::HttpStatus { status: 502, .. })
        ));
        assert_eq!(transport.call_count(&url), 1);
    }

    #[test]
    fn test_resolve_media_null_payload() {
        let transport = ScriptedTransport::new();
        let resolver = resolver(&transport, 1);
        let media = MediaRef::new("gone");
        transport.respond(&resolver.media_api_url(&media), 200, r#"{"resObj": null}"#);

        assert!(matches!(
            resolver.resolve_media(&media),
            Err(CatalogError::MediaNotFound(id)) if id == "gone"
        ));
    }
}
