//! Command sanitization and the per-command request value.
//!
//! Remote command text is untrusted. Before anything reaches the host's
//! executor, [`sanitize`] strips the shell-dangerous characters
//! `` " ' ` \ | ; $ < > `` anywhere in the string and trims surrounding
//! whitespace. The function is total (always produces output, never fails)
//! and idempotent (sanitizing already-sanitized text is a no-op), which
//! the tests below pin down.
//!
//! The host's command grammar does not use a leading `/` prefix marker;
//! [`strip_slash`] removes one before dispatch so operators can paste
//! commands in either form.

use serde::{Deserialize, Serialize};

/// Characters removed from command text before it can reach the executor.
const FORBIDDEN: &[char] = &['"', '\'', '`', '\\', '|', ';', '$', '<', '>'];

/// Strips forbidden characters anywhere in the string, then trims
/// leading/trailing whitespace.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !FORBIDDEN.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Removes a single leading `/`, if present.
pub fn strip_slash(clean: &str) -> &str {
    clean.strip_prefix('/').unwrap_or(clean)
}

/// Where a command originated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOrigin {
    /// Submitted through the host's own local entry points.
    Local,
    /// Submitted by a remote transport session, identified by its id.
    Session(String),
}

impl std::fmt::Display for CommandOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandOrigin::Local => write!(f, "local"),
            CommandOrigin::Session(id) => write!(f, "{id}"),
        }
    }
}

/// Immutable record of one inbound command.
///
/// Created per command, handed to the pipeline, discarded once the
/// executor call returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// The text exactly as received from the transport.
    pub raw: String,
    /// Sanitized text (forbidden characters stripped, trimmed).
    pub clean: String,
    /// Originating session, or local.
    pub origin: CommandOrigin,
}

impl CommandRequest {
    /// Builds a request, sanitizing `raw` in the process.
    pub fn new(raw: impl Into<String>, origin: CommandOrigin) -> Self {
        let raw = raw.into();
        let clean = sanitize(&raw);
        Self { raw, clean, origin }
    }

    /// True if nothing useful remained after sanitization. Blank requests
    /// are rejected before any executor dispatch.
    pub fn is_blank(&self) -> bool {
        self.clean.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_all_forbidden_characters() {
        let dirty = r#"say "hi"; cat /etc/passwd | $SHELL `id` <x> \'"#;
        let clean = sanitize(dirty);
        for c in FORBIDDEN {
            assert!(
                !clean.contains(*c),
                "sanitized output must not contain {c:?}, got {clean:?}"
            );
        }
    }

    #[test]
    fn test_sanitize_trims_surrounding_whitespace() {
        assert_eq!(sanitize("  gamemode creative  "), "gamemode creative");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            "plain",
            "  spaced  ",
            r#"we|ird;$tuff"#,
            "",
            "   ",
            "/warp home",
        ];
        for raw in inputs {
            let once = sanitize(raw);
            let twice = sanitize(&once);
            assert_eq!(once, twice, "sanitize must be idempotent for {raw:?}");
        }
    }

    #[test]
    fn test_sanitize_is_total_on_empty_input() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("   "), "");
    }

    #[test]
    fn test_sanitize_preserves_interior_whitespace() {
        assert_eq!(sanitize("tp alice  bob"), "tp alice  bob");
    }

    #[test]
    fn test_strip_slash_removes_single_leading_slash() {
        assert_eq!(strip_slash("/gamemode creative"), "gamemode creative");
    }

    #[test]
    fn test_strip_slash_leaves_unprefixed_commands_alone() {
        assert_eq!(strip_slash("gamemode creative"), "gamemode creative");
    }

    #[test]
    fn test_strip_slash_only_removes_one_slash() {
        // A doubled slash is not a prefix marker; leave the second intact.
        assert_eq!(strip_slash("//wand"), "/wand");
    }

    #[test]
    fn test_command_request_sanitizes_on_construction() {
        let req = CommandRequest::new("  /say \"hello\"  ", CommandOrigin::Local);
        assert_eq!(req.raw, "  /say \"hello\"  ");
        assert_eq!(req.clean, "/say hello");
    }

    #[test]
    fn test_command_request_blank_detection() {
        assert!(CommandRequest::new("", CommandOrigin::Local).is_blank());
        assert!(CommandRequest::new("   ", CommandOrigin::Local).is_blank());
        assert!(CommandRequest::new(";;;", CommandOrigin::Local).is_blank());
        assert!(!CommandRequest::new("stats", CommandOrigin::Local).is_blank());
    }

    #[test]
    fn test_origin_display() {
        assert_eq!(CommandOrigin::Local.to_string(), "local");
        assert_eq!(
            CommandOrigin::Session("abc-123".into()).to_string(),
            "abc-123"
        );
    }
}
