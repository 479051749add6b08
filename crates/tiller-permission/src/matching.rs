// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use regex::Regex;

use tiller_model::catalog;

/// Whether `tool` matches a single allow/disallow list entry.
///
/// Exact name match always counts.  For MCP tools of the form
/// `mcp__<server>__<tool>`, the entries `mcp__<server>` (module wildcard)
/// and `mcp__<server>__*` (explicit wildcard) also match.
fn tool_matches(entry: &str, tool: &str) -> bool {
    if entry == tool {
        return true;
    }
    if let Some(server) = catalog::mcp_server(tool) {
        let module = format!("mcp__{server}");
        return entry == module || entry == format!("{module}__*");
    }
    false
}

/// Whether any list entry matches `tool`.
pub fn tool_matches_any(list: &[String], tool: &str) -> bool {
    list.iter().any(|entry| tool_matches(entry, tool))
}

/// Whether a shell command matches an allow/disallow command pattern.
///
/// Patterns containing `*` become a full-string regex with `*` → `.*`.
/// Everything else matches on exact equality or on `pattern + " "` as a
/// prefix; disallow patterns additionally match on substring containment.
pub fn command_matches(pattern: &str, command: &str, disallow: bool) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if pattern.contains('*') {
        return glob_to_regex(pattern)
            .map(|re| re.is_match(command))
            .unwrap_or(false);
    }
    if command == pattern || command.starts_with(&format!("{pattern} ")) {
        return true;
    }
    disallow && command.contains(pattern)
}

/// Convert a `*`-glob into an anchored [`Regex`].
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn list(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| s.to_string()).collect()
    }

    // ── Tool list matching ────────────────────────────────────────────────────

    #[test]
    fn exact_tool_name_matches() {
        assert!(tool_matches_any(&list(&["Bash"]), "Bash"));
        assert!(!tool_matches_any(&list(&["Bash"]), "Write"));
    }

    #[test]
    fn mcp_module_wildcard_matches_every_server_tool() {
        let entries = list(&["mcp__github"]);
        assert!(tool_matches_any(&entries, "mcp__github__create_issue"));
        assert!(tool_matches_any(&entries, "mcp__github__list_prs"));
        assert!(!tool_matches_any(&entries, "mcp__gitlab__create_issue"));
    }

    #[test]
    fn mcp_explicit_wildcard_matches() {
        let entries = list(&["mcp__github__*"]);
        assert!(tool_matches_any(&entries, "mcp__github__create_issue"));
        assert!(!tool_matches_any(&entries, "mcp__gitlab__anything"));
    }

    #[test]
    fn plain_tools_do_not_match_mcp_wildcards() {
        assert!(!tool_matches_any(&list(&["mcp__github"]), "Bash"));
        assert!(!tool_matches_any(&list(&["mcp__github__*"]), "github"));
    }

    // ── Command pattern matching ──────────────────────────────────────────────

    #[test]
    fn star_pattern_is_full_string_regex() {
        assert!(command_matches("git *", "git status", false));
        assert!(command_matches("git *", "git push origin main", false));
        assert!(!command_matches("git *", "cargo git", false));
        assert!(!command_matches("git *", "git", false), "full-string match");
    }

    #[test]
    fn plain_pattern_matches_exact_or_prefix_space() {
        assert!(command_matches("ls", "ls", false));
        assert!(command_matches("ls", "ls -la", false));
        assert!(!command_matches("ls", "lsof", false));
    }

    #[test]
    fn disallow_also_matches_substring() {
        assert!(command_matches("rm -rf", "echo test && rm -rf /", true));
        assert!(!command_matches("rm -rf", "echo test && rm -rf /", false));
    }

    #[test]
    fn regex_metacharacters_in_patterns_are_literal() {
        assert!(command_matches("echo $(id)", "echo $(id)", false));
        assert!(!command_matches("echo .", "echo x", false));
        assert!(command_matches("cat *.rs", "cat main.rs", false));
    }

    #[test]
    fn empty_pattern_never_matches() {
        assert!(!command_matches("", "anything", true));
        assert!(!command_matches("", "", false));
    }
}
