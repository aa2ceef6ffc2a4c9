//! animelon_dl - Download series, episodes and subtitles from a video catalog
//!
//! This library resolves catalog page URLs into playable media, picks a video
//! link the CDN is willing to serve, and stores videos plus their subtitle
//! tracks below an output directory. Downloads run as independent tasks
//! bounded by a concurrency limit.

pub mod catalog;
pub mod config;
pub mod file_naming;
pub mod gate;
pub mod link_selector;
pub mod locator;
pub mod orchestrator;
pub mod sink;
pub mod stream_downloader;
pub mod subtitles;
pub mod transport;

// Re-export error types
pub use catalog::{CatalogError, UnknownQualityTier};
pub use gate::GateError;
pub use link_selector::LinkError;
pub use locator::LocatorError;
pub use stream_downloader::DownloadError;
pub use subtitles::SubtitleError;
pub use transport::TransportError;

// Re-export the types needed to drive an acquisition
pub use catalog::{LanguageKey, QualityTier};
pub use config::AcquisitionConfig;
pub use locator::{Identifier, MediaRef, SeriesRef};
pub use orchestrator::{
    Acquirer, AcquisitionEvent, AcquisitionTask, EpisodeSelection, LaunchFailure, LocatorOutcome,
    LocatorReport, MediaOutcome, MediaReport, SeriesLaunch, plan_series,
};
pub use sink::{FsSink, Sink};
pub use subtitles::{PassthroughDecryptor, SubtitleDecryptor};
pub use transport::{HttpTransport, Transport};

use thiserror::Error;

/// Top-level error type of an acquisition task
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// The locator could not be parsed
    #[error("Locator error: {0}")]
    Locator(#[from] LocatorError),

    /// Error while resolving catalog metadata
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// No video link could be opened
    #[error("Link selection error: {0}")]
    Link(#[from] LinkError),

    /// Error while decrypting or storing subtitles
    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),

    /// Error while streaming the video to storage
    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    /// Error while setting up a transport
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The task could not be started
    #[error("Scheduling error: {0}")]
    Gate(#[from] GateError),
}

impl AcquisitionError {
    /// Whether another attempt of the same task may succeed.
    ///
    /// Lookups and link probes are repeated; a failed transfer or an
    /// undecryptable subtitle is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AcquisitionError::Catalog(_) | AcquisitionError::Link(_))
    }
}
