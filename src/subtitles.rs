//! Subtitle extraction
//!
//! Pulls the requested language variants out of a media record's subtitle
//! channels, decrypts them, detects whether they are SRT or ASS and stores
//! them next to the video.

use crate::catalog::{LanguageKey, SubtitleSet};
use crate::sink::Sink;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while extracting subtitles
#[derive(Debug, Error)]
pub enum SubtitleError {
    /// The decryption capability rejected a payload
    #[error("Failed to decrypt {language} subtitle: {reason}")]
    DecryptionFailed { language: String, reason: String },

    /// Failed to store a subtitle file
    #[error("Failed to write subtitle file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Turns an encrypted subtitle payload into plaintext subtitle bytes.
///
/// The cipher is owned by the catalog; implementations are supplied by the
/// embedding application.
pub trait SubtitleDecryptor: Send + Sync {
    fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>, String>;
}

/// Decryptor for payloads that are already plaintext
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughDecryptor;

impl SubtitleDecryptor for PassthroughDecryptor {
    fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>, String> {
        Ok(ciphertext.as_bytes().to_vec())
    }
}

/// Subtitle file formats the catalog emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    Srt,
    Ass,
}

impl SubtitleFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SubtitleFormat::Srt => "srt",
            SubtitleFormat::Ass => "ass",
        }
    }
}

/// First cue index of an SRT file: `1`, newline, then the `00` of `00:00:..`
const SRT_MAGIC: &[u8] = b"1\n00";

/// Classifies decrypted subtitle bytes.
///
/// Only SRT and ASS are ever produced, so anything that does not open like
/// an SRT file is ASS.
pub fn classify_format(bytes: &[u8]) -> SubtitleFormat {
    if bytes.starts_with(SRT_MAGIC) {
        SubtitleFormat::Srt
    } else {
        SubtitleFormat::Ass
    }
}

/// File name of a subtitle track: `<code>_<mediaTitle>.<srt|ass>`
pub fn name_file(language: &LanguageKey, media_title: &str, format: SubtitleFormat) -> PathBuf {
    PathBuf::from(format!(
        "{}_{}.{}",
        language.file_code(),
        media_title,
        format.extension()
    ))
}

/// Decrypts and stores subtitle tracks
pub struct SubtitleExtractor<'a> {
    decryptor: &'a dyn SubtitleDecryptor,
}

impl<'a> SubtitleExtractor<'a> {
    pub fn new(decryptor: &'a dyn SubtitleDecryptor) -> Self {
        Self { decryptor }
    }

    /// Decrypts every requested language of every channel.
    ///
    /// Output follows channel order, then the order of `languages`. Languages
    /// a channel does not carry are skipped.
    pub fn extract(
        &self,
        subtitles: &SubtitleSet,
        languages: &[LanguageKey],
    ) -> Result<Vec<(LanguageKey, Vec<u8>)>, SubtitleError> {
        let mut tracks = Vec::new();

        for channel in &subtitles.channels {
            for language in languages {
                let Some(ciphertext) = channel.get(language) else {
                    continue;
                };
                let plaintext = self.decryptor.decrypt(ciphertext).map_err(|reason| {
                    SubtitleError::DecryptionFailed {
                        language: language.to_string(),
                        reason,
                    }
                })?;
                tracks.push((language.clone(), plaintext));
            }
        }

        Ok(tracks)
    }

    /// Extracts the requested tracks and writes each into `directory`.
    ///
    /// Returns the paths as resolved by the sink. Channels carrying the same
    /// language map to the same file; the later channel wins.
    pub fn save_all(
        &self,
        subtitles: &SubtitleSet,
        languages: &[LanguageKey],
        media_title: &str,
        directory: &Path,
        sink: &dyn Sink,
    ) -> Result<Vec<PathBuf>, SubtitleError> {
        let mut written = Vec::new();

        for (language, plaintext) in self.extract(subtitles, languages)? {
            let format = classify_format(&plaintext);
            let relative = directory.join(name_file(&language, media_title, format));

            let path = sink
                .write_bytes(&relative, &plaintext)
                .map_err(|source| SubtitleError::WriteFailed {
                    path: relative.clone(),
                    source,
                })?;
            debug!(path = %path.display(), %language, "saved subtitle");
            written.push(path);
        }

        Ok(written)
    }
}
