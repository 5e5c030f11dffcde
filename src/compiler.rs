//! Turns a [`DownloadRequest`] into the exact argv handed to yt-dlp.
//!
//! Compilation is pure: no filesystem access, no validation of format ids.
//! Every flag and value is its own argument, so nothing the user typed is ever
//! interpreted by a shell.

use std::path::Path;

use crate::request::{DownloadRequest, SelectionMode, SubtitleSelection};

/// Longest stem (in characters) used for the output template.
pub const MAX_STEM_CHARS: usize = 100;
/// Stem used when the title is missing or sanitizes to nothing.
pub const FALLBACK_STEM: &str = "download";

const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const FALLBACK_VIDEO_SELECTOR: &str = "bestvideo[height<=1080]";
const FALLBACK_AUDIO_SELECTOR: &str = "bestaudio";
const FALLBACK_CUSTOM_SELECTOR: &str = "best[height<=1080]";
const AUTO_SUBTITLE_LANG: &str = "en";

/// Argument list for one extractor invocation plus, for downloads, the stem the
/// output file is expected to start with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledCommand {
    args: Vec<String>,
    stem: Option<String>,
}

impl CompiledCommand {
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn stem(&self) -> Option<&str> {
        self.stem.as_deref()
    }

    /// Value passed to `-f`, if the command selects a format explicitly.
    pub fn format_selector(&self) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == "-f")
            .and_then(|idx| self.args.get(idx + 1))
            .map(String::as_str)
    }
}

/// Builds the metadata probe: `--dump-json <url>`.
pub fn compile_analyze(source_url: &str) -> CompiledCommand {
    CompiledCommand {
        args: vec!["--dump-json".to_owned(), source_url.to_owned()],
        stem: None,
    }
}

/// Builds the download invocation writing into `download_dir`.
pub fn compile_download(request: &DownloadRequest, download_dir: &Path) -> CompiledCommand {
    let stem = sanitize_stem(&request.display_title);
    let template = download_dir.join(format!("{stem}.%(ext)s"));

    let mut args = vec!["-o".to_owned(), template.to_string_lossy().into_owned()];

    if let Some(selector) = format_selector(request) {
        args.push("-f".to_owned());
        args.push(selector);
    }

    if request.include_thumbnail {
        args.push("--write-thumbnail".to_owned());
    }

    if request.selection_mode != SelectionMode::AudioOnly {
        match &request.subtitle_selection {
            SubtitleSelection::None => {}
            SubtitleSelection::AutoGenerated => {
                args.extend(["--write-auto-sub", "--sub-lang", AUTO_SUBTITLE_LANG].map(String::from));
            }
            SubtitleSelection::LanguageCode(code) => {
                args.extend(["--write-sub".to_owned(), "--sub-lang".to_owned(), code.clone()]);
            }
        }
    }

    if let Some(range) = &request.trim_range {
        let section = match &range.to {
            Some(to) => format!("*{}-{}", range.from, to),
            None => format!("*{}-", range.from),
        };
        args.push("--download-sections".to_owned());
        args.push(section);
    }

    args.push(request.source_url.clone());

    CompiledCommand {
        args,
        stem: Some(stem),
    }
}

fn format_selector(request: &DownloadRequest) -> Option<String> {
    let video = request.video_format_id.as_deref();
    let audio = request.audio_format_id.as_deref();

    match request.selection_mode {
        SelectionMode::BestCombined => None,
        SelectionMode::VideoOnly => Some(video.unwrap_or(FALLBACK_VIDEO_SELECTOR).to_owned()),
        SelectionMode::AudioOnly => Some(audio.unwrap_or(FALLBACK_AUDIO_SELECTOR).to_owned()),
        SelectionMode::Custom => Some(match (video, audio) {
            (Some(video), Some(audio)) => format!("{video}+{audio}"),
            (Some(single), None) | (None, Some(single)) => single.to_owned(),
            (None, None) => FALLBACK_CUSTOM_SELECTOR.to_owned(),
        }),
    }
}

/// Derives a filesystem-safe stem from a display title: reserved characters
/// removed, whitespace runs collapsed to `_`, capped at [`MAX_STEM_CHARS`].
pub fn sanitize_stem(title: &str) -> String {
    let mut stem = String::with_capacity(title.len());
    let mut in_whitespace = false;

    for c in title.chars().filter(|c| !INVALID_FILENAME_CHARS.contains(c)) {
        if c.is_whitespace() {
            if !in_whitespace {
                stem.push('_');
            }
            in_whitespace = true;
        } else {
            stem.push(c);
            in_whitespace = false;
        }
    }

    let stem: String = stem.chars().take(MAX_STEM_CHARS).collect();
    if stem.is_empty() {
        FALLBACK_STEM.to_owned()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{DownloadPayload, TrimRange};

    fn request(mode: SelectionMode) -> DownloadRequest {
        DownloadRequest {
            source_url: "https://www.youtube.com/watch?v=abc".into(),
            selection_mode: mode,
            video_format_id: None,
            audio_format_id: None,
            include_thumbnail: false,
            subtitle_selection: SubtitleSelection::None,
            trim_range: None,
            display_title: "My Video".into(),
        }
    }

    fn compile(request: &DownloadRequest) -> CompiledCommand {
        compile_download(request, Path::new("downloads"))
    }

    /// Reads the ids back out of a compiled selector.
    fn ids_from_selector(selector: &str) -> (Option<&str>, Option<&str>) {
        match selector.split_once('+') {
            Some((video, audio)) => (Some(video), Some(audio)),
            None => (Some(selector), None),
        }
    }

    #[test]
    fn best_combined_has_no_format_flag() {
        let mut req = request(SelectionMode::BestCombined);
        req.video_format_id = Some("137".into());
        req.audio_format_id = Some("140".into());
        let cmd = compile(&req);
        assert!(!cmd.args().iter().any(|arg| arg == "-f"));
        assert_eq!(cmd.format_selector(), None);
    }

    #[test]
    fn output_template_and_url_frame_the_argv() {
        let cmd = compile(&request(SelectionMode::BestCombined));
        assert_eq!(
            cmd.args(),
            ["-o", "downloads/My_Video.%(ext)s", "https://www.youtube.com/watch?v=abc"]
        );
        assert_eq!(cmd.stem(), Some("My_Video"));
    }

    #[test]
    fn custom_joins_video_and_audio_ids() {
        let mut req = request(SelectionMode::Custom);
        req.video_format_id = Some("137".into());
        req.audio_format_id = Some("140".into());
        assert_eq!(compile(&req).format_selector(), Some("137+140"));
    }

    #[test]
    fn custom_single_id_and_fallback() {
        let mut req = request(SelectionMode::Custom);
        assert_eq!(compile(&req).format_selector(), Some("best[height<=1080]"));

        req.audio_format_id = Some("251".into());
        assert_eq!(compile(&req).format_selector(), Some("251"));

        req.audio_format_id = None;
        req.video_format_id = Some("248".into());
        assert_eq!(compile(&req).format_selector(), Some("248"));
    }

    #[test]
    fn video_and_audio_only_fall_back_to_capped_selectors() {
        assert_eq!(
            compile(&request(SelectionMode::VideoOnly)).format_selector(),
            Some("bestvideo[height<=1080]")
        );
        assert_eq!(
            compile(&request(SelectionMode::AudioOnly)).format_selector(),
            Some("bestaudio")
        );

        let mut req = request(SelectionMode::VideoOnly);
        req.video_format_id = Some("137".into());
        req.audio_format_id = Some("140".into());
        assert_eq!(compile(&req).format_selector(), Some("137"));
    }

    #[test]
    fn unknown_download_type_ignores_format_ids() {
        let payload: DownloadPayload = serde_json::from_value(serde_json::json!({
            "url": "https://youtu.be/abc",
            "downloadType": "4k",
            "videoFormat": "137",
            "audioFormat": "140"
        }))
        .unwrap();
        let req = DownloadRequest::from_payload(payload).unwrap();
        let cmd = compile(&req);
        assert_eq!(cmd.format_selector(), None);
        assert_eq!(
            cmd.args(),
            ["-o", "downloads/download.%(ext)s", "https://youtu.be/abc"]
        );
    }

    #[test]
    fn selector_round_trips_ids() {
        let cases = [
            (SelectionMode::Custom, Some("137"), Some("140")),
            (SelectionMode::Custom, Some("248"), None),
            (SelectionMode::VideoOnly, Some("137"), None),
            (SelectionMode::AudioOnly, None, Some("140")),
        ];
        for (mode, video, audio) in cases {
            let mut req = request(mode);
            req.video_format_id = video.map(String::from);
            req.audio_format_id = audio.map(String::from);
            let cmd = compile(&req);
            let selector = cmd.format_selector().unwrap();
            let (first, second) = ids_from_selector(selector);
            match (video, audio) {
                (Some(_), Some(_)) => assert_eq!((first, second), (video, audio)),
                (Some(_), None) => assert_eq!(first, video),
                (None, Some(_)) => assert_eq!(first, audio),
                (None, None) => unreachable!(),
            }
        }
    }

    #[test]
    fn thumbnail_and_subtitle_flags() {
        let mut req = request(SelectionMode::BestCombined);
        req.include_thumbnail = true;
        req.subtitle_selection = SubtitleSelection::AutoGenerated;
        let cmd = compile(&req);
        let args: Vec<&str> = cmd.args().iter().map(String::as_str).collect();
        assert!(args.contains(&"--write-thumbnail"));
        assert!(args.windows(3).any(|w| w == ["--write-auto-sub", "--sub-lang", "en"]));

        req.subtitle_selection = SubtitleSelection::LanguageCode("fr".into());
        let cmd = compile(&req);
        let args: Vec<&str> = cmd.args().iter().map(String::as_str).collect();
        assert!(args.windows(3).any(|w| w == ["--write-sub", "--sub-lang", "fr"]));
    }

    #[test]
    fn audio_only_ignores_subtitles() {
        let mut req = request(SelectionMode::AudioOnly);
        req.subtitle_selection = SubtitleSelection::LanguageCode("fr".into());
        let cmd = compile(&req);
        assert!(!cmd.args().iter().any(|arg| arg.starts_with("--write-")));
        assert!(!cmd.args().iter().any(|arg| arg == "--sub-lang"));
    }

    #[test]
    fn trim_range_sections() {
        let mut req = request(SelectionMode::BestCombined);
        req.trim_range = Some(TrimRange {
            from: "00:01:00".into(),
            to: Some("00:02:30".into()),
        });
        let cmd = compile(&req);
        let args: Vec<&str> = cmd.args().iter().map(String::as_str).collect();
        assert!(args.windows(2).any(|w| w == ["--download-sections", "*00:01:00-00:02:30"]));

        req.trim_range = Some(TrimRange {
            from: "90".into(),
            to: None,
        });
        let cmd = compile(&req);
        let args: Vec<&str> = cmd.args().iter().map(String::as_str).collect();
        assert!(args.windows(2).any(|w| w == ["--download-sections", "*90-"]));
    }

    #[test]
    fn url_is_last_and_never_split() {
        let mut req = request(SelectionMode::Custom);
        req.source_url = "https://example.com/v?id=1; rm -rf ~".into();
        let cmd = compile(&req);
        assert_eq!(cmd.args().last().map(String::as_str), Some(req.source_url.as_str()));
    }

    #[test]
    fn sanitize_strips_reserved_characters_and_caps_length() {
        let stem = sanitize_stem(r#"a<b>c:d"e/f\g|h?i*j"#);
        assert_eq!(stem, "abcdefghij");

        let long = "x".repeat(250);
        assert_eq!(sanitize_stem(&long).chars().count(), MAX_STEM_CHARS);

        let mixed = format!("{}{}", "Ü?".repeat(80), "<>");
        let stem = sanitize_stem(&mixed);
        assert!(stem.chars().count() <= MAX_STEM_CHARS);
        assert!(!stem.contains(INVALID_FILENAME_CHARS));
    }

    #[test]
    fn sanitize_collapses_whitespace() {
        assert_eq!(sanitize_stem("My  Great \t Video"), "My_Great_Video");
        assert_eq!(sanitize_stem("Live | Part 1"), "Live_Part_1");
    }

    #[test]
    fn empty_title_uses_fallback_stem() {
        assert_eq!(sanitize_stem(""), FALLBACK_STEM);
        assert_eq!(sanitize_stem("???"), FALLBACK_STEM);
    }

    #[test]
    fn analyze_command_dumps_json() {
        let cmd = compile_analyze("https://youtu.be/abc");
        assert_eq!(cmd.args(), ["--dump-json", "https://youtu.be/abc"]);
        assert_eq!(cmd.stem(), None);
    }
}
