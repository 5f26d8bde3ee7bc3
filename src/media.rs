//! # Receipt Image Handling
//!
//! Format sniffing for downloaded receipts and an on-disk archive that keeps each
//! image next to the ledger entry it produced.

use anyhow::{Context, Result};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::MAX_IMAGE_SIZE;

pub const MIN_FORMAT_BYTES: usize = 8;

/// Why a downloaded file was rejected before recognition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRejection {
    TooSmall(usize),
    TooLarge(usize),
    UnknownFormat,
    UnsupportedFormat(String),
}

impl std::fmt::Display for ImageRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageRejection::TooSmall(len) => write!(f, "image too small ({len} bytes)"),
            ImageRejection::TooLarge(len) => write!(f, "image too large ({len} bytes)"),
            ImageRejection::UnknownFormat => write!(f, "unrecognized image format"),
            ImageRejection::UnsupportedFormat(format) => {
                write!(f, "unsupported image format: {format}")
            }
        }
    }
}

impl std::error::Error for ImageRejection {}

/// Detect the image format from magic bytes and check it is one we forward
pub fn sniff_format(bytes: &[u8]) -> std::result::Result<ImageFormat, ImageRejection> {
    if bytes.len() < MIN_FORMAT_BYTES {
        return Err(ImageRejection::TooSmall(bytes.len()));
    }
    if bytes.len() > MAX_IMAGE_SIZE {
        return Err(ImageRejection::TooLarge(bytes.len()));
    }

    let format = image::guess_format(bytes).map_err(|_| ImageRejection::UnknownFormat)?;
    let supported = matches!(
        format,
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Bmp | ImageFormat::Gif | ImageFormat::WebP
    );

    if supported {
        debug!(format = ?format, "Detected supported image format");
        Ok(format)
    } else {
        Err(ImageRejection::UnsupportedFormat(format!("{format:?}")))
    }
}

/// File extension used when archiving a given format
pub fn extension_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        _ => "jpg",
    }
}

/// MIME type for inlining the image into a data URL
pub fn mime_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        _ => "image/jpeg",
    }
}

/// Directory that keeps received receipt images
#[derive(Debug, Clone)]
pub struct ImageArchive {
    dir: PathBuf,
}

impl ImageArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the image as `{user_id}_{unix_seconds}.{ext}` and return its path
    pub async fn save(
        &self,
        user_id: &str,
        unix_seconds: i64,
        format: ImageFormat,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create archive dir {}", self.dir.display()))?;

        let safe_user: String = user_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let path = self
            .dir
            .join(format!("{safe_user}_{unix_seconds}.{}", extension_for(format)));

        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write image {}", path.display()))?;
        info!(user_id = %user_id, path = %path.display(), size = bytes.len(), "Receipt image archived");
        Ok(path)
    }
}
