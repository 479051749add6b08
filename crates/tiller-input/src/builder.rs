// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;

use tracing::debug;

use tiller_image::EncodedImage;
use tiller_model::ContentBlock;

use crate::refs::extract_image_refs;

/// One image reference that could not be loaded.  Never fatal on its own:
/// the turn proceeds with whatever content remains.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRefError {
    pub reference: String,
    pub message: String,
}

/// The expansion of one raw user input.
#[derive(Debug, Clone)]
pub struct BuiltMessage {
    /// Ordered blocks for the runtime.  Empty only when the input was
    /// nothing but failed image references; callers treat that send as
    /// failed.
    pub content_blocks: Vec<ContentBlock>,
    /// The input with reference tokens removed and whitespace runs
    /// collapsed.
    pub processed_text: String,
    pub images: Vec<EncodedImage>,
    pub errors: Vec<ImageRefError>,
}

/// Expand raw user text into runtime content blocks.
///
/// Image references (`@path` tokens) are loaded as base64 blocks in their
/// appearance order, after exactly one text block carrying the remaining
/// text.  The text block is omitted when the stripped text is empty and at
/// least one image loaded.
pub fn build_stream_message(raw: &str, cwd: &Path) -> BuiltMessage {
    if raw.is_empty() {
        return BuiltMessage {
            content_blocks: vec![ContentBlock::text("")],
            processed_text: String::new(),
            images: Vec::new(),
            errors: Vec::new(),
        };
    }

    // Whitespace-only input is preserved verbatim.
    if raw.trim().is_empty() {
        return BuiltMessage {
            content_blocks: vec![ContentBlock::text(raw)],
            processed_text: raw.to_string(),
            images: Vec::new(),
            errors: Vec::new(),
        };
    }

    let refs = extract_image_refs(raw);

    let mut images: Vec<EncodedImage> = Vec::new();
    let mut errors: Vec<ImageRefError> = Vec::new();
    let mut stripped = raw.to_string();

    for r in &refs {
        stripped = stripped.replace(&r.token, " ");
        match tiller_image::load_image(&r.resolve(cwd)) {
            Ok(img) => images.push(img),
            Err(e) => {
                debug!(reference = %r.token, error = %e, "image reference failed to load");
                errors.push(ImageRefError {
                    reference: r.token.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    let processed_text = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut content_blocks: Vec<ContentBlock> = Vec::new();
    if processed_text.is_empty() {
        // Only failed references and nothing else: no content at all.
        if images.is_empty() && !errors.is_empty() {
            return BuiltMessage {
                content_blocks,
                processed_text,
                images,
                errors,
            };
        }
        // Text block is omitted when images carry the turn alone.
        if images.is_empty() {
            content_blocks.push(ContentBlock::text(""));
        }
    } else {
        content_blocks.push(ContentBlock::text(processed_text.clone()));
    }
    for img in &images {
        content_blocks.push(ContentBlock::image(img.media_type.clone(), img.to_base64()));
    }

    BuiltMessage {
        content_blocks,
        processed_text,
        images,
        errors,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
