// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// One `@path` image reference found in user text, in appearance order.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageReference {
    /// The exact token as written, including the `@` (e.g. `@./shot.png`).
    pub token: String,
    /// The path part, not yet resolved against the working directory.
    pub path: PathBuf,
}

impl ImageReference {
    /// Resolve the referenced path against `cwd` (absolute paths pass
    /// through unchanged).
    pub fn resolve(&self, cwd: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            cwd.join(&self.path)
        }
    }
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@(\S+)").unwrap())
}

/// Extract all image references from `text`.
///
/// A token counts as an image reference when it is `@` followed by a
/// relative or absolute path with a supported image extension (png, jpg,
/// jpeg, gif, webp).  Other `@` mentions are left alone.  Trailing sentence
/// punctuation is not part of the path.
pub fn extract_image_refs(text: &str) -> Vec<ImageReference> {
    token_re()
        .captures_iter(text)
        .filter_map(|cap| {
            let raw = cap.get(1).unwrap().as_str();
            let trimmed = raw.trim_end_matches([',', ';', ':', '!', '?', ')', '.']);
            let path_str = if trimmed.is_empty() { raw } else { trimmed };
            let path = Path::new(path_str);
            if tiller_image::is_image_path(path) {
                Some(ImageReference {
                    token: format!("@{path_str}"),
                    path: path.to_path_buf(),
                })
            } else {
                None
            }
        })
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_relative_and_absolute_paths() {
        let refs = extract_image_refs("see @./a.png and @/abs/b.jpg and @c.webp");
        let tokens: Vec<&str> = refs.iter().map(|r| r.token.as_str()).collect();
        assert_eq!(tokens, vec!["@./a.png", "@/abs/b.jpg", "@c.webp"]);
    }

    #[test]
    fn ignores_non_image_mentions() {
        let refs = extract_image_refs("ping @alice about @notes.txt and @main.rs");
        assert!(refs.is_empty());
    }

    #[test]
    fn trailing_punctuation_is_not_part_of_the_path() {
        let refs = extract_image_refs("look at @shot.png, please");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].token, "@shot.png");
        assert_eq!(refs[0].path, Path::new("shot.png"));
    }

    #[test]
    fn preserves_appearance_order() {
        let refs = extract_image_refs("@z.png then @a.png");
        assert_eq!(refs[0].path, Path::new("z.png"));
        assert_eq!(refs[1].path, Path::new("a.png"));
    }

    #[test]
    fn resolve_joins_relative_against_cwd() {
        let r = ImageReference {
            token: "@./x.png".into(),
            path: PathBuf::from("./x.png"),
        };
        assert_eq!(r.resolve(Path::new("/work")), Path::new("/work/./x.png"));

        let abs = ImageReference {
            token: "@/tmp/x.png".into(),
            path: PathBuf::from("/tmp/x.png"),
        };
        assert_eq!(abs.resolve(Path::new("/work")), Path::new("/tmp/x.png"));
    }

    #[test]
    fn case_insensitive_extensions_match() {
        let refs = extract_image_refs("screenshot @SHOT.PNG here");
        assert_eq!(refs.len(), 1);
    }
}
