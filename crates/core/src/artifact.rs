//! Artifact extraction from engine output payloads.
//!
//! The target node reports its result as a mapping with a `text` field
//! whose first element is itself a JSON-serialized list, e.g.
//!
//! ```json
//! { "text": ["[true, [\"/out/clip_00001.png\", \"/out/clip_00001.mp4\"]]"] }
//! ```
//!
//! Element 1 of the inner list holds candidate file paths; the first one
//! with a known media suffix is the artifact. Extraction is total: any
//! other shape yields a [`NoArtifact`] value, never a panic.

use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;

/// Payload field carrying the serialized path list.
const TEXT_FIELD: &str = "text";

/// Suffixes accepted by default. The engine's video nodes list a preview
/// still before the video itself, so image suffixes are opt-in.
pub const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".avi", ".mov"];

pub const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".webp", ".gif"];

/// Media kind inferred from an artifact's file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
}

/// The final outcome of a successful job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedArtifact {
    pub path: String,
    pub kind: MediaKind,
}

/// Why a payload did not yield an artifact.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NoArtifact {
    #[error("payload has no 'text' field")]
    MissingTextField,
    #[error("'text' field is not a string or a non-empty list of strings")]
    UnexpectedTextShape,
    #[error("serialized output is not valid JSON: {0}")]
    MalformedSerialization(String),
    #[error("serialized output is not a list of at least two elements")]
    TooShort,
    #[error("second element of serialized output is not a list of paths")]
    NoPathList,
    #[error("no path with a known media suffix")]
    NoMatchingSuffix,
}

impl From<NoArtifact> for CoreError {
    fn from(reason: NoArtifact) -> Self {
        CoreError::NoArtifactInPayload(reason.to_string())
    }
}

/// Parses output payloads against a configurable suffix set.
#[derive(Debug, Clone)]
pub struct ArtifactExtractor {
    extensions: Vec<(String, MediaKind)>,
}

impl Default for ArtifactExtractor {
    fn default() -> Self {
        Self {
            extensions: VIDEO_EXTENSIONS
                .iter()
                .map(|ext| (ext.to_string(), MediaKind::Video))
                .collect(),
        }
    }
}

impl ArtifactExtractor {
    /// Also accept still images. The first matching path in payload order
    /// wins regardless of its kind.
    pub fn with_images(mut self) -> Self {
        self.extensions.extend(
            IMAGE_EXTENSIONS
                .iter()
                .map(|ext| (ext.to_string(), MediaKind::Image)),
        );
        self
    }

    /// Add a custom suffix (including the leading dot).
    pub fn with_extension(mut self, ext: impl Into<String>, kind: MediaKind) -> Self {
        self.extensions.push((ext.into().to_ascii_lowercase(), kind));
        self
    }

    /// Infer the media kind of `path` from its suffix (case-insensitive).
    pub fn classify(&self, path: &str) -> Option<MediaKind> {
        let lower = path.to_ascii_lowercase();
        self.extensions
            .iter()
            .find(|(ext, _)| lower.ends_with(ext.as_str()))
            .map(|(_, kind)| *kind)
    }

    /// Isolate the artifact path from one node's output payload.
    pub fn extract(&self, payload: &Value) -> Result<ResolvedArtifact, NoArtifact> {
        let serialized = match payload.get(TEXT_FIELD) {
            None => return Err(NoArtifact::MissingTextField),
            Some(Value::Array(items)) => items
                .first()
                .and_then(Value::as_str)
                .ok_or(NoArtifact::UnexpectedTextShape)?,
            Some(Value::String(s)) => s.as_str(),
            Some(_) => return Err(NoArtifact::UnexpectedTextShape),
        };

        let parsed: Value = serde_json::from_str(serialized)
            .map_err(|e| NoArtifact::MalformedSerialization(e.to_string()))?;

        let outer = parsed
            .as_array()
            .filter(|items| items.len() >= 2)
            .ok_or(NoArtifact::TooShort)?;

        let paths = outer[1].as_array().ok_or(NoArtifact::NoPathList)?;

        paths
            .iter()
            .filter_map(Value::as_str)
            .find_map(|path| {
                self.classify(path).map(|kind| ResolvedArtifact {
                    path: path.to_string(),
                    kind,
                })
            })
            .ok_or(NoArtifact::NoMatchingSuffix)
    }
}

/// Extract with the default (video) suffix set.
pub fn extract_artifact(payload: &Value) -> Result<ResolvedArtifact, NoArtifact> {
    ArtifactExtractor::default().extract(payload)
}
