//! The per-call input to the orchestrator.

/// Where the reference image comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// Raw file bytes, e.g. from a multipart upload.
    Bytes {
        filename: String,
        content_type: String,
        data: Vec<u8>,
    },
    /// A base64-encoded image (optionally a `data:` URL).
    Base64(String),
    /// A reference name the engine already knows; no upload is performed.
    Uploaded(String),
}

/// One end-user generation request. Consumed once by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub image: ImageSource,
    pub prompt: String,
    pub negative_prompt: String,
}

impl JobRequest {
    /// Create a request with an empty negative prompt.
    pub fn new(image: ImageSource, prompt: impl Into<String>) -> Self {
        Self {
            image,
            prompt: prompt.into(),
            negative_prompt: String::new(),
        }
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = negative_prompt.into();
        self
    }
}
