//! Download intent as received from the client form and its validated shape.
//!
//! The wire payload keeps the camelCase field names the desktop UI sends; the
//! validated [`DownloadRequest`] is what the command compiler consumes.

use serde::Deserialize;
use thiserror::Error;

/// Raw `/download` body. Every field is optional so that a missing value can be
/// reported as a validation error instead of a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadPayload {
    pub url: Option<String>,
    pub download_type: Option<String>,
    pub download_thumbnail: Option<bool>,
    pub video_format: Option<String>,
    pub audio_format: Option<String>,
    pub subtitle_format: Option<String>,
    pub duration_from: Option<String>,
    pub duration_to: Option<String>,
    pub video_title: Option<String>,
}

/// Raw `/analyze` body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzePayload {
    pub url: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("No URL provided")]
    MissingUrl,
}

/// High-level format intent picked in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    BestCombined,
    VideoOnly,
    AudioOnly,
    Custom,
}

impl SelectionMode {
    /// Unknown or missing values leave format choice to yt-dlp.
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("video-only") => Self::VideoOnly,
            Some("audio-only") => Self::AudioOnly,
            Some("custom") => Self::Custom,
            _ => Self::BestCombined,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtitleSelection {
    None,
    LanguageCode(String),
    AutoGenerated,
}

impl SubtitleSelection {
    pub fn from_wire(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::None,
            Some("auto") => Self::AutoGenerated,
            Some(code) => Self::LanguageCode(code.to_owned()),
        }
    }
}

/// Section of the media to fetch. `to = None` means "until the end".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimRange {
    pub from: String,
    pub to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub source_url: String,
    pub selection_mode: SelectionMode,
    pub video_format_id: Option<String>,
    pub audio_format_id: Option<String>,
    pub include_thumbnail: bool,
    pub subtitle_selection: SubtitleSelection,
    pub trim_range: Option<TrimRange>,
    pub display_title: String,
}

impl DownloadRequest {
    /// Validates the wire payload. Only a missing URL is rejected; every other
    /// field degrades to its neutral value.
    pub fn from_payload(payload: DownloadPayload) -> Result<Self, RequestError> {
        let url = non_empty(payload.url).ok_or(RequestError::MissingUrl)?;

        let trim_range = non_empty(payload.duration_from).map(|from| TrimRange {
            from,
            to: non_empty(payload.duration_to),
        });

        Ok(Self {
            source_url: clean_source_url(&url),
            selection_mode: SelectionMode::from_wire(payload.download_type.as_deref()),
            video_format_id: non_empty(payload.video_format),
            audio_format_id: non_empty(payload.audio_format),
            include_thumbnail: payload.download_thumbnail.unwrap_or(false),
            subtitle_selection: SubtitleSelection::from_wire(payload.subtitle_format.as_deref()),
            trim_range,
            display_title: payload.video_title.unwrap_or_default(),
        })
    }
}

/// Strips playlist and query-chain parameters from a pasted URL.
///
/// This is a plain string cut, not URL parsing: everything from `?list=` (or
/// `&list=`) onwards is dropped, then everything from the first `&`.
pub fn clean_source_url(raw: &str) -> String {
    let raw = raw.trim();
    let without_list = if let Some((head, _)) = raw.split_once("?list=") {
        head
    } else if let Some((head, _)) = raw.split_once("&list=") {
        head
    } else {
        raw
    };
    without_list
        .split('&')
        .next()
        .unwrap_or(without_list)
        .to_owned()
}

/// Accepts a URL from the analyze body, applying the same validation as downloads.
pub fn analyze_url(payload: AnalyzePayload) -> Result<String, RequestError> {
    non_empty(payload.url)
        .map(|url| clean_source_url(&url))
        .ok_or(RequestError::MissingUrl)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
