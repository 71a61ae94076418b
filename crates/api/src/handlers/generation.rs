//! Handler for the video generation endpoint.

use axum::extract::{Multipart, State};
use axum::Json;
use clipgen_core::artifact::MediaKind;
use clipgen_core::request::{ImageSource, JobRequest};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Content type assumed for file parts that do not declare one.
const DEFAULT_IMAGE_CONTENT_TYPE: &str = "image/png";

/// Successful generation result.
#[derive(Debug, Serialize)]
pub struct GenerateVideoResponse {
    pub generated_video_path: String,
    pub media_kind: MediaKind,
}

/// POST /generate-video
///
/// Multipart fields:
/// - `image`: the reference image as a file part, or a text part holding
///   base64 (optionally a `data:` URL)
/// - `prompt`: positive prompt (required, passed through verbatim)
/// - `negative_prompt`: negative prompt (optional)
///
/// Blocks until the job finishes.
pub async fn generate_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<GenerateVideoResponse>> {
    let mut image: Option<ImageSource> = None;
    let mut prompt: Option<String> = None;
    let mut negative_prompt: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_IMAGE_CONTENT_TYPE)
                    .to_string();
                image = Some(match filename {
                    Some(filename) => {
                        let data = field
                            .bytes()
                            .await
                            .map_err(|e| AppError::BadRequest(e.to_string()))?;
                        ImageSource::Bytes {
                            filename,
                            content_type,
                            data: data.to_vec(),
                        }
                    }
                    None => ImageSource::Base64(
                        field
                            .text()
                            .await
                            .map_err(|e| AppError::BadRequest(e.to_string()))?,
                    ),
                });
            }
            "prompt" => {
                prompt = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?,
                );
            }
            "negative_prompt" => {
                negative_prompt = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?,
                );
            }
            _ => {} // ignore unknown fields
        }
    }

    let image = image.ok_or_else(|| AppError::BadRequest("Missing required 'image' field".into()))?;
    let prompt =
        prompt.ok_or_else(|| AppError::BadRequest("Missing required 'prompt' field".into()))?;

    let request =
        JobRequest::new(image, prompt).with_negative_prompt(negative_prompt.unwrap_or_default());

    let artifact = state.orchestrator.generate(request).await?;

    Ok(Json(GenerateVideoResponse {
        generated_video_path: artifact.path,
        media_kind: artifact.kind,
    }))
}
