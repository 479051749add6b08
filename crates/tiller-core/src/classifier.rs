// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Maps runtime and transport errors onto a small taxonomy with fixed
//! user-facing strings.  A pure lexicon lookup, kept out of the arbiter's
//! hot path and used by the engine when a query fails or is interrupted.

/// The error classes the engine surfaces to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Authentication,
    RateLimit,
    Timeout,
    Interrupted,
    Unknown,
}

/// Classify an error by its name and message (both matched case-insensitively).
pub fn classify(name: &str, message: &str) -> ErrorKind {
    let name = name.to_lowercase();
    let message = message.to_lowercase();
    let has = |needle: &str| message.contains(needle);

    if [
        "enotfound",
        "econnrefused",
        "econnreset",
        "network",
        "dns",
        "socket",
        "connection refused",
        "unable to connect",
    ]
    .iter()
    .any(|&n| has(n))
    {
        return ErrorKind::Network;
    }

    if [
        "401",
        "403",
        "api key",
        "authentication",
        "unauthorized",
        "forbidden",
        "invalid key",
        "invalid_api_key",
    ]
    .iter()
    .any(|&n| has(n))
    {
        return ErrorKind::Authentication;
    }

    if [
        "429",
        "rate limit",
        "rate_limit",
        "too many requests",
        "quota exceeded",
        "throttl",
    ]
    .iter()
    .any(|&n| has(n))
    {
        return ErrorKind::RateLimit;
    }

    if name.starts_with("timeout") || has("timeout") || has("timed out") || has("etimedout") {
        return ErrorKind::Timeout;
    }

    if name == "aborterror"
        || has("aborted")
        || has("cancelled")
        || has("canceled")
    {
        return ErrorKind::Interrupted;
    }

    ErrorKind::Unknown
}

/// The fixed user-facing string for an error class.
pub fn user_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Network => "Network error: check your connection and try again.",
        ErrorKind::Authentication => "Authentication failed: check your API key.",
        ErrorKind::RateLimit => "Rate limit reached: wait a moment and try again.",
        ErrorKind::Timeout => "The request timed out: try again.",
        ErrorKind::Interrupted => "Interrupted by user.",
        ErrorKind::Unknown => "An unexpected error occurred.",
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
