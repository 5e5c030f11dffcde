//! Normalization of yt-dlp's `--dump-json` payload into the display schema.
//!
//! The raw structs below only name the handful of fields the UI shows; the
//! extractor emits far more and serde ignores the rest. Every raw field is
//! optional because older or non-YouTube sources routinely omit them, and a
//! missing field must never turn an analyze call into an error.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const UNKNOWN: &str = "Unknown";

#[derive(Debug, Error)]
pub enum MetadataError {
    /// Extractor stdout was not a JSON document of the expected shape.
    #[error("extractor output is not valid metadata JSON")]
    Malformed(#[from] serde_json::Error),
}

/// Subset of the extractor's top-level object.
#[derive(Debug, Deserialize)]
struct RawVideo {
    title: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    view_count: Option<f64>,
    upload_date: Option<String>,
    formats: Option<Vec<RawFormat>>,
}

/// One entry of the extractor's `formats` array.
#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: Option<String>,
    ext: Option<String>,
    resolution: Option<String>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
    vcodec: Option<String>,
    acodec: Option<String>,
    format_note: Option<String>,
}

/// Display snapshot of a single video, as rendered by the analyze view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoInfo {
    pub title: String,
    pub thumbnail: String,
    pub duration: String,
    pub uploader: String,
    pub view_count: u64,
    pub upload_date: String,
}

/// One selectable track/container reported by the extractor.
///
/// Field names follow the extractor's own JSON so the client can keep reading
/// `format_id`, `vcodec` and friends directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatDescriptor {
    pub format_id: String,
    pub ext: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcodec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acodec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_note: Option<String>,
}

impl FormatDescriptor {
    /// No video stream: `vcodec` missing or `"none"`.
    pub fn is_audio_only(&self) -> bool {
        codec_missing(self.vcodec.as_deref())
    }

    /// No audio stream: `acodec` missing or `"none"`.
    pub fn is_video_only(&self) -> bool {
        codec_missing(self.acodec.as_deref())
    }
}

fn codec_missing(codec: Option<&str>) -> bool {
    codec.is_none_or(|value| value == "none")
}

/// Body of a successful `/analyze` response.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeReport {
    pub info: VideoInfo,
    pub formats: Vec<FormatDescriptor>,
}

/// Parses raw extractor stdout and maps it onto [`AnalyzeReport`].
pub fn normalize(raw: &str) -> Result<AnalyzeReport, MetadataError> {
    let video: RawVideo = serde_json::from_str(raw)?;

    let info = VideoInfo {
        title: non_empty(video.title).unwrap_or_else(|| UNKNOWN.to_owned()),
        thumbnail: video.thumbnail.unwrap_or_default(),
        duration: format_duration(video.duration).unwrap_or_else(|| UNKNOWN.to_owned()),
        uploader: non_empty(video.uploader).unwrap_or_else(|| UNKNOWN.to_owned()),
        view_count: video.view_count.and_then(whole_count).unwrap_or(0),
        upload_date: video
            .upload_date
            .as_deref()
            .and_then(format_upload_date)
            .unwrap_or_else(|| UNKNOWN.to_owned()),
    };

    let formats = video
        .formats
        .unwrap_or_default()
        .into_iter()
        .filter_map(descriptor_from_raw)
        .collect();

    Ok(AnalyzeReport { info, formats })
}

fn descriptor_from_raw(raw: RawFormat) -> Option<FormatDescriptor> {
    let format_id = non_empty(raw.format_id)?;
    Some(FormatDescriptor {
        format_id,
        ext: raw.ext.unwrap_or_default(),
        resolution: raw.resolution,
        filesize: raw.filesize.or(raw.filesize_approx).and_then(whole_count),
        vcodec: raw.vcodec,
        acodec: raw.acodec,
        format_note: raw.format_note,
    })
}

/// Counts arrive as JSON numbers of any shape; negatives and NaN are dropped.
fn whole_count(value: f64) -> Option<u64> {
    (value.is_finite() && value >= 0.0).then(|| value as u64)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Renders durations as `H:MM:SS`, or `M:SS` under an hour. Fractional
/// seconds are dropped; zero or missing durations yield `None`.
pub fn format_duration(seconds: Option<f64>) -> Option<String> {
    let seconds = seconds.filter(|s| s.is_finite() && *s > 0.0)?.floor() as u64;
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        Some(format!("{hours}:{minutes:02}:{secs:02}"))
    } else {
        Some(format!("{minutes}:{secs:02}"))
    }
}

/// Converts yt-dlp's `YYYYMMDD` into a long-form date such as
/// `January 2, 2024`. Input that is not a valid date comes back unchanged;
/// empty input yields `None`.
pub fn format_upload_date(value: &str) -> Option<String> {
    if value.is_empty() {
        return None;
    }
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Some(value.to_owned());
    }
    match NaiveDate::parse_from_str(value, "%Y%m%d") {
        Ok(date) => Some(date.format("%B %-d, %Y").to_string()),
        Err(_) => Some(value.to_owned()),
    }
}
