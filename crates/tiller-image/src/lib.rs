// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Image loading and base64 encoding for multimodal user turns.
//!
//! Media types are detected from the file header (png, jpeg, gif, webp);
//! the extension is never trusted.  Files above [`MAX_FILE_BYTES`] are
//! rejected.  Images whose either axis exceeds [`MAX_DIMENSION`] are
//! downscaled preserving aspect ratio before encoding; within-limit images
//! are passed through byte-for-byte so the provider sees the original file.
//!
//! Encoded results are cached in an in-process LRU keyed on the SHA-256 of
//! the raw file bytes, so repeated references to the same image (or to
//! identical content at different paths) skip the decode → resize →
//! re-encode work.

use std::io::Cursor;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use sha2::Digest as _;

pub use error::ImageError;

mod error;

/// Maximum accepted file size.
pub const MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;

/// Maximum width or height in pixels before downscaling.
pub const MAX_DIMENSION: u32 = 2048;

/// Maximum number of encoded images held in the in-process LRU cache.
pub const CACHE_CAPACITY: usize = 32;

type CacheKey = [u8; 32]; // SHA-256 digest

fn image_cache() -> &'static Mutex<lru::LruCache<CacheKey, EncodedImage>> {
    static CACHE: OnceLock<Mutex<lru::LruCache<CacheKey, EncodedImage>>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(lru::LruCache::new(
            NonZeroUsize::new(CACHE_CAPACITY).unwrap(),
        ))
    })
}

/// An image loaded, bounded, and ready for base64 embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    /// MIME type, e.g. `"image/png"`.
    pub media_type: String,
    /// Raw bytes of the (possibly re-encoded) image.
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn to_base64(&self) -> String {
        B64.encode(&self.bytes)
    }
}

/// Detect the media type from the file header.
///
/// Returns `None` for anything that is not png, jpeg, gif, or webp.
pub fn detect_media_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(b"\xff\xd8\xff") {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && bytes[8..12] == *b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Whether `path` has a supported image extension.  Used to recognise
/// `@path` reference tokens; the header check on load is still decisive.
pub fn is_image_path(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    matches!(ext.as_str(), "png" | "jpg" | "jpeg" | "gif" | "webp")
}

/// Load an image from `path`, enforce the size limits, and return an
/// [`EncodedImage`].
pub fn load_image(path: &Path) -> Result<EncodedImage, ImageError> {
    let meta =
        std::fs::metadata(path).map_err(|e| ImageError::Io(path.display().to_string(), e))?;
    if meta.len() > MAX_FILE_BYTES {
        return Err(ImageError::TooLarge(
            path.display().to_string(),
            meta.len(),
            MAX_FILE_BYTES,
        ));
    }

    let raw = std::fs::read(path).map_err(|e| ImageError::Io(path.display().to_string(), e))?;

    let key: CacheKey = sha2::Sha256::digest(&raw).into();
    if let Ok(mut cache) = image_cache().lock() {
        if let Some(cached) = cache.get(&key) {
            return Ok(cached.clone());
        }
    }

    let result = encode_image_bytes(&raw, path)?;

    if let Ok(mut cache) = image_cache().lock() {
        cache.put(key, result.clone());
    }

    Ok(result)
}

/// Bound the dimensions of raw image bytes.
///
/// Within-limit images pass through untouched.  Oversized images are
/// decoded, downscaled with Lanczos3, and re-encoded: png stays png,
/// everything else becomes jpeg (gif animation does not survive a resize
/// anyway, and webp re-encoding is not worth a second codec path).
fn encode_image_bytes(raw: &[u8], hint_path: &Path) -> Result<EncodedImage, ImageError> {
    let media_type = detect_media_type(raw)
        .ok_or_else(|| ImageError::UnsupportedFormat(hint_path.display().to_string()))?;

    let fmt = match media_type {
        "image/png" => image::ImageFormat::Png,
        "image/jpeg" => image::ImageFormat::Jpeg,
        "image/gif" => image::ImageFormat::Gif,
        _ => image::ImageFormat::WebP,
    };

    let img = image::load_from_memory_with_format(raw, fmt)
        .map_err(|e| ImageError::Decode(hint_path.display().to_string(), e.to_string()))?;

    let (w, h) = (img.width(), img.height());
    if w <= MAX_DIMENSION && h <= MAX_DIMENSION {
        return Ok(EncodedImage {
            media_type: media_type.to_string(),
            bytes: raw.to_vec(),
        });
    }

    let ratio_w = MAX_DIMENSION as f64 / w as f64;
    let ratio_h = MAX_DIMENSION as f64 / h as f64;
    let ratio = ratio_w.min(ratio_h);
    let new_w = ((w as f64 * ratio).round() as u32).max(1);
    let new_h = ((h as f64 * ratio).round() as u32).max(1);
    let img = img.resize(new_w, new_h, image::imageops::FilterType::Lanczos3);

    let mut out = Cursor::new(Vec::new());
    if media_type == "image/png" {
        img.write_to(&mut out, image::ImageFormat::Png)
            .map_err(|e| ImageError::Encode(e.to_string()))?;
        Ok(EncodedImage {
            media_type: "image/png".into(),
            bytes: out.into_inner(),
        })
    } else {
        img.to_rgb8()
            .write_to(&mut out, image::ImageFormat::Jpeg)
            .map_err(|e| ImageError::Encode(e.to_string()))?;
        Ok(EncodedImage {
            media_type: "image/jpeg".into(),
            bytes: out.into_inner(),
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
