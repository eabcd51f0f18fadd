//! Poster classification
//!
//! Maps a file to a poster kind from its MIME type, as reported by
//! `xdg-mime query filetype`. Rules are tried in order, first match wins.

use regex::Regex;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use tracing::{debug, info};

/// How a poster is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PosterKind {
    /// Static document shown by a document viewer
    Document,
    /// Looping video shown by a media player
    Video,
}

impl std::fmt::Display for PosterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Document => f.write_str("document"),
            Self::Video => f.write_str("video"),
        }
    }
}

static RULES: LazyLock<Vec<(Regex, PosterKind)>> = LazyLock::new(|| {
    [
        (r"^application/pdf$", PosterKind::Document),
        (r"^video/", PosterKind::Video),
    ]
    .into_iter()
    .filter_map(|(pattern, kind)| Regex::new(pattern).ok().map(|re| (re, kind)))
    .collect()
});

/// Match a MIME type against the classification rules
#[must_use]
pub fn classify_mime(mime: &str) -> Option<PosterKind> {
    RULES
        .iter()
        .find(|(pattern, _)| pattern.is_match(mime))
        .map(|(_, kind)| *kind)
}

/// Ask the MIME query tool for a file's type
///
/// Failures yield an empty string, which no rule matches.
#[must_use]
pub fn query_mime(mime_query: &str, path: &Path) -> String {
    let output = Command::new(mime_query)
        .args(["query", "filetype"])
        .arg(path)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output();

    match output {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        Ok(output) => {
            debug!("{} exited with {} for {:?}", mime_query, output.status, path);
            String::new()
        }
        Err(e) => {
            debug!("Failed to run {}: {}", mime_query, e);
            String::new()
        }
    }
}

/// Classify a poster file; `None` means the file must be skipped
#[must_use]
pub fn classify(mime_query: &str, path: &Path) -> Option<PosterKind> {
    let mime = query_mime(mime_query, path);
    debug!("{:?} has type \"{}\"", path, mime);

    let kind = classify_mime(&mime);
    if kind.is_none() {
        info!("Do not know how to handle filetype \"{}\" of {:?}", mime, path);
    }
    kind
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("application/pdf" => Some(PosterKind::Document); "pdf document")]
    #[test_case("video/mp4" => Some(PosterKind::Video); "mp4 video")]
    #[test_case("video/x-matroska" => Some(PosterKind::Video); "matroska video")]
    #[test_case("text/plain" => None; "plain text")]
    #[test_case("application/pdfx" => None; "pdf lookalike")]
    #[test_case("image/video" => None; "video not a prefix")]
    #[test_case("" => None; "failed query")]
    fn test_classify_mime(mime: &str) -> Option<PosterKind> {
        classify_mime(mime)
    }

    #[test]
    fn test_missing_query_tool_yields_empty_type() {
        let mime = query_mime("posterwall-no-such-tool", Path::new("/tmp/x.pdf"));
        assert!(mime.is_empty());
        assert_eq!(
            classify("posterwall-no-such-tool", Path::new("/tmp/x.pdf")),
            None
        );
    }

    #[test]
    fn test_query_tool_output_is_trimmed() {
        // `echo query filetype <path>` stands in for xdg-mime
        let mime = query_mime("echo", Path::new("x.pdf"));
        assert_eq!(mime, "query filetype x.pdf");
    }
}
