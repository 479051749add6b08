// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("could not read image file '{0}': {1}")]
    Io(String, #[source] std::io::Error),

    #[error("image file '{0}' is {1} bytes, above the {2} byte limit")]
    TooLarge(String, u64, u64),

    #[error("unsupported image format for file '{0}' (expected png, jpeg, gif, or webp)")]
    UnsupportedFormat(String),

    #[error("could not decode image '{0}': {1}")]
    Decode(String, String),

    #[error("could not encode image: {0}")]
    Encode(String),
}
