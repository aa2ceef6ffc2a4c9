//! Output layout
//!
//! Videos of a series land in `<series>/S<season:02>/<series> S<season>E<episode>.mp4`,
//! single videos in `<title>.mp4`. All paths are relative to the sink root.

use std::path::PathBuf;

/// Extension of stored videos
pub const VIDEO_EXTENSION: &str = "mp4";

/// Characters that cannot appear in a path component on common filesystems
fn is_reserved(c: char) -> bool {
    matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control()
}

/// Turns a catalog title into a single path component.
///
/// Reserved characters become `-`; surrounding whitespace and dots are removed.
pub fn sanitize_filename(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| if is_reserved(c) { '-' } else { c })
        .collect();

    replaced
        .trim_matches(|c: char| c.is_whitespace() || c == '.')
        .to_string()
}

/// `<series>` directory for a series title
pub fn series_directory(series_title: &str) -> PathBuf {
    PathBuf::from(sanitize_filename(series_title))
}

/// `<series>/S<season:02>`
pub fn season_directory(series_title: &str, season: u32) -> PathBuf {
    series_directory(series_title).join(format!("S{season:02}"))
}

/// `<series>/S<season:02>/<series> S<season>E<episode>.mp4`, episode 1-based
pub fn episode_path(series_title: &str, season: u32, episode: usize) -> PathBuf {
    let file_name = format!(
        "{} S{season}E{episode}.{VIDEO_EXTENSION}",
        sanitize_filename(series_title)
    );
    season_directory(series_title, season).join(file_name)
}

/// `<title>.mp4` for a video downloaded on its own
pub fn single_video_path(media_title: &str) -> PathBuf {
    PathBuf::from(format!("{}.{VIDEO_EXTENSION}", sanitize_filename(media_title)))
}
