//! # Image generation
//!
//! [`ImageGenerator`] turns a text prompt into encoded image bytes. [`StabilityImages`]
//! talks to a Stability-style multipart endpoint; [`save_image`] writes the result
//! where the `create_image` tool reports it.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::multipart::Form;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use crate::BoxError;
use crate::config::ImageConfig;

/// Style presets accepted by the image service.
pub const STYLE_PRESETS: [&str; 17] = [
    "3d-model",
    "analog-film",
    "anime",
    "cinematic",
    "comic-book",
    "digital-art",
    "enhance",
    "fantasy-art",
    "isometric",
    "line-art",
    "low-poly",
    "modeling-compound",
    "neon-punk",
    "origami",
    "photographic",
    "pixel-art",
    "tile-texture",
];

/// Characters of the prompt kept in the image file name.
const FILE_STEM_CHARS: usize = 15;

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, style_preset: Option<&str>) -> Result<Vec<u8>, BoxError>;
}

#[derive(Deserialize)]
struct ImageResponse {
    image: String,
}

pub struct StabilityImages {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    negative_prompt: String,
}

impl StabilityImages {
    pub fn new(config: &ImageConfig, timeout_secs: Option<u64>) -> Result<Self, BoxError> {
        Ok(Self {
            http: crate::http_client(timeout_secs)?,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            negative_prompt: config.negative_prompt.clone(),
        })
    }
}

#[async_trait]
impl ImageGenerator for StabilityImages {
    async fn generate(&self, prompt: &str, style_preset: Option<&str>) -> Result<Vec<u8>, BoxError> {
        let mut form = Form::new()
            .text("prompt", prompt.to_string())
            .text("model", self.model.clone())
            .text("negative_prompt", self.negative_prompt.clone());
        if let Some(preset) = style_preset {
            form = form.text("style_preset", preset.to_string());
        }

        debug!("Requesting image for prompt {:?} ({:?})", prompt, style_preset);

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("accept", "application/json")
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Image generation failed with {status}: {body}").into());
        }

        let response: ImageResponse = response.json().await?;
        Ok(BASE64.decode(response.image.as_bytes())?)
    }
}

/// File stem derived from the first characters of `prompt`.
///
/// Anything other than letters, digits, `-` and `_` becomes `_`, so the prompt can
/// never name a path outside the output directory.
pub fn image_file_stem(prompt: &str) -> String {
    let stem: String = prompt
        .trim()
        .chars()
        .take(FILE_STEM_CHARS)
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if stem.is_empty() {
        "image".to_string()
    } else {
        stem
    }
}

/// Write `bytes` to `<output_dir>/<stem>.jpeg`, creating the directory if needed.
pub fn save_image(output_dir: impl AsRef<Path>, prompt: &str, bytes: &[u8]) -> Result<PathBuf, BoxError> {
    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(format!("{}.jpeg", image_file_stem(prompt)));
    fs::write(&path, bytes)?;
    info!("Saved image to {}", path.display());
    Ok(path)
}
