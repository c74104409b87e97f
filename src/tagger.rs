use std::{io::Cursor, sync::Arc};
use base64::Engine;
use bytes::Bytes;
use image::{ImageFormat, ImageReader};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::openai::Captioner;

/// Used whenever no caption can be obtained for an image.
pub const PLACEHOLDER_TAG: &str = "unlabeled clothing item";

pub const CAPTION_INSTRUCTION: &str = "Describe this clothing item in a short, ecommerce-style phrase (e.g., 'cream wool blazer' or 'black leather sneakers'). Avoid extra commentary.";

#[derive(Debug, Error, PartialEq)]
pub enum ImageError {
    #[error("{file}: not valid base64: {reason}")]
    Encoding { file: String, reason: String },
    #[error("{file}: unsupported image format, expected jpeg or png")]
    Unsupported { file: String },
    #[error("{file}: could not read image: {reason}")]
    Decode { file: String, reason: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum TagError {
    #[error("no uploaded image with key '{0}'")]
    UnknownImage(String),
    #[error("tag for image '{0}' is empty")]
    BlankTag(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType { Jpeg, Png }

impl MediaType {
    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagSource { Caption, Placeholder }

/// A decoded upload, ready to be sent to the captioning capability.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub file_name: String,
    pub media_type: MediaType,
    pub width: u32,
    pub height: u32,
    pub bytes: Bytes,
}

impl ImagePayload {
    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type.mime(), self.base64())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaggedImage {
    pub key: String,
    pub file_name: String,
    pub media_type: MediaType,
    pub width: u32,
    pub height: u32,
    pub preview_base64: String,
    pub suggested_tag: String,
    /// Current, possibly edited, text. This is what a confirmation appends.
    pub tag: String,
    pub tag_source: TagSource,
    pub confirmations: u32,
}

pub fn decode_upload(file_name: &str, data_base64: &str) -> Result<ImagePayload, ImageError> {
    // Accept both bare base64 and a data URL as produced by FileReader.readAsDataURL.
    let raw = data_base64.split_once(";base64,").map(|(_, b)| b).unwrap_or(data_base64);
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(raw.trim())
        .map_err(|e| ImageError::Encoding { file: file_name.to_string(), reason: e.to_string() })?;

    let media_type = match image::guess_format(&bytes) {
        Ok(ImageFormat::Jpeg) => MediaType::Jpeg,
        Ok(ImageFormat::Png) => MediaType::Png,
        _ => return Err(ImageError::Unsupported { file: file_name.to_string() }),
    };

    let (width, height) = ImageReader::with_format(Cursor::new(&bytes), match media_type {
        MediaType::Jpeg => ImageFormat::Jpeg,
        MediaType::Png => ImageFormat::Png,
    })
    .into_dimensions()
    .map_err(|e| ImageError::Decode { file: file_name.to_string(), reason: e.to_string() })?;

    Ok(ImagePayload { file_name: file_name.to_string(), media_type, width, height, bytes: Bytes::from(bytes) })
}

/// Stable per-image key derived from the file name.
pub fn image_key(file_name: &str) -> String {
    let key: String = file_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let key = key.trim_matches('-');
    if key.is_empty() { "image".to_string() } else { key.to_string() }
}

pub struct ImageTagger {
    captioner: Option<Arc<dyn Captioner>>,
}

impl ImageTagger {
    pub fn new(captioner: Option<Arc<dyn Captioner>>) -> Self { Self { captioner } }

    pub fn is_captioning(&self) -> bool { self.captioner.is_some() }

    /// Suggests a tag for one image. Captioning failures never propagate: the
    /// placeholder is returned instead so wardrobe assembly is never blocked.
    pub async fn suggest(&self, image: &ImagePayload) -> (String, TagSource) {
        let Some(captioner) = &self.captioner else {
            info!("🏷️ Captioning not configured, using placeholder for {}", image.file_name);
            return (PLACEHOLDER_TAG.to_string(), TagSource::Placeholder);
        };

        match captioner.caption(CAPTION_INSTRUCTION, image).await {
            Ok(caption) => {
                let caption = caption.trim().trim_matches(|c| c == '"' || c == '\'' || c == '.').trim().to_string();
                if caption.is_empty() {
                    warn!("⚠️ Empty caption for {}, using placeholder", image.file_name);
                    (PLACEHOLDER_TAG.to_string(), TagSource::Placeholder)
                } else {
                    info!("✅ Tagged {} as '{}'", image.file_name, caption);
                    (caption, TagSource::Caption)
                }
            }
            Err(e) => {
                warn!("❌ Captioning {} failed: {}; falling back to placeholder", image.file_name, e);
                (PLACEHOLDER_TAG.to_string(), TagSource::Placeholder)
            }
        }
    }

    pub async fn tag(&self, image: ImagePayload) -> TaggedImage {
        let (suggested_tag, tag_source) = self.suggest(&image).await;
        TaggedImage {
            key: image_key(&image.file_name),
            preview_base64: image.base64(),
            file_name: image.file_name,
            media_type: image.media_type,
            width: image.width,
            height: image.height,
            tag: suggested_tag.clone(),
            suggested_tag,
            tag_source,
            confirmations: 0,
        }
    }
}
