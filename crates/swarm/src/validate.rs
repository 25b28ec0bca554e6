// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure input validation. Every public operation in the kernel runs its
//! arguments through these functions before any side effect.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SwarmError};

/// Maximum message content size after sanitization, in bytes.
pub const MAX_CONTENT_BYTES: usize = 10_240;
/// Maximum agent id length in characters.
pub const MAX_AGENT_ID_LEN: usize = 64;
/// Maximum recipients addressed by one broadcast.
pub const MAX_RECIPIENTS: usize = 50;

/// Validate an agent identifier. Returns the id unchanged on success.
pub fn validate_agent_id(id: &str) -> Result<&str> {
    if id.is_empty() {
        return Err(SwarmError::validation("agent_id", id, "must not be empty"));
    }
    if id.chars().count() > MAX_AGENT_ID_LEN {
        return Err(SwarmError::validation(
            "agent_id",
            id,
            format!("longer than {MAX_AGENT_ID_LEN} characters"),
        ));
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(SwarmError::validation(
            "agent_id",
            id,
            "only letters, digits, underscore and hyphen are allowed",
        ));
    }
    if id.starts_with('-') || id.ends_with('-') {
        return Err(SwarmError::validation("agent_id", id, "must not start or end with a hyphen"));
    }
    Ok(id)
}

/// Validate a multiplexer-native pane id of the form `%<digits>`.
pub fn validate_pane_id(pane_id: &str) -> Result<&str> {
    let digits = pane_id.strip_prefix('%').unwrap_or("");
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Ok(pane_id)
    } else {
        Err(SwarmError::validation("pane_id", pane_id, "expected %<digits>"))
    }
}

/// Validate message content size. Content is expected to be sanitized first.
pub fn validate_message_content(content: &str) -> Result<&str> {
    if content.is_empty() {
        return Err(SwarmError::validation("content", content, "must not be empty"));
    }
    if content.len() > MAX_CONTENT_BYTES {
        return Err(SwarmError::validation(
            "content",
            format!("<{} bytes>", content.len()),
            format!("exceeds {MAX_CONTENT_BYTES} bytes"),
        ));
    }
    Ok(content)
}

/// Strip null bytes and control characters (tab and newline survive),
/// normalize CRLF to LF, and trim surrounding whitespace.
///
/// Idempotent: sanitizing already-sanitized content is a no-op.
pub fn sanitize_message_content(content: &str) -> String {
    let normalized = content.replace("\r\n", "\n");
    let stripped: String =
        normalized.chars().filter(|&c| c == '\t' || c == '\n' || !c.is_control()).collect();
    stripped.trim().to_owned()
}

/// Validate a path relative to `project_root`, rejecting traversal.
///
/// Returns the normalized project-relative path; the project root itself
/// normalizes to `.`. When `project_root` is `None` only the lexical rules
/// apply. Symlinks are resolved through the nearest existing ancestor before
/// the containment re-check, so a link pointing outside the root is rejected
/// even though the path components look contained.
pub fn validate_file_path(path: &str, project_root: Option<&Path>) -> Result<PathBuf> {
    if path.is_empty() {
        return Err(SwarmError::validation("path", path, "must not be empty"));
    }
    if path.contains('\0') {
        return Err(SwarmError::validation("path", path, "contains a null byte"));
    }
    let lower = path.to_ascii_lowercase();
    if lower.contains("%2e%2e") || lower.contains("%2f") || lower.contains("%5c") {
        return Err(SwarmError::validation("path", path, "URL-encoded traversal"));
    }

    let candidate = Path::new(path);
    for component in candidate.components() {
        if matches!(component, Component::ParentDir) {
            return Err(SwarmError::validation("path", path, "contains a `..` component"));
        }
    }

    let Some(root) = project_root else {
        return Ok(clean_components(candidate));
    };

    let root = root
        .canonicalize()
        .map_err(|e| SwarmError::io(format!("canonicalize {}", root.display()), &e))?;
    let absolute = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    // Resolve symlinks through the deepest ancestor that exists, then
    // re-attach the remaining (possibly not-yet-created) suffix.
    let resolved = resolve_existing_prefix(&absolute);
    if !resolved.starts_with(&root) {
        return Err(SwarmError::validation("path", path, "escapes the project root"));
    }

    let relative = resolved.strip_prefix(&root).unwrap_or(Path::new(""));
    if relative.as_os_str().is_empty() {
        Ok(PathBuf::from("."))
    } else {
        Ok(relative.to_path_buf())
    }
}

/// Canonicalize the longest existing prefix of `path`, keeping the
/// non-existing suffix lexical. Glob patterns therefore validate without
/// touching their meta components.
fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let mut prefix = path.to_path_buf();
    let mut suffix: Vec<std::ffi::OsString> = Vec::new();

    loop {
        match prefix.canonicalize() {
            Ok(resolved) => {
                let mut out = resolved;
                for part in suffix.iter().rev() {
                    out.push(part);
                }
                return out;
            }
            Err(_) => match (prefix.file_name(), prefix.parent()) {
                (Some(name), Some(parent)) => {
                    suffix.push(name.to_os_string());
                    prefix = parent.to_path_buf();
                }
                _ => return path.to_path_buf(),
            },
        }
    }
}

/// Drop `.` components without touching anything else.
fn clean_components(path: &Path) -> PathBuf {
    path.components().filter(|c| !matches!(c, Component::CurDir)).collect()
}

/// Validate a timeout in whole seconds.
pub fn validate_timeout(seconds: u64) -> Result<u64> {
    if (1..=3600).contains(&seconds) {
        Ok(seconds)
    } else {
        Err(SwarmError::validation("timeout", seconds.to_string(), "must be 1..=3600 seconds"))
    }
}

/// Validate a retry count.
pub fn validate_retry_count(retries: u32) -> Result<u32> {
    if retries <= 5 {
        Ok(retries)
    } else {
        Err(SwarmError::validation("retry_count", retries.to_string(), "must be 0..=5"))
    }
}

/// Validate a rate-limit configuration of `max` messages per `window_secs`.
pub fn validate_rate_limit_config(max: u32, window_secs: u64) -> Result<(u32, u64)> {
    if !(1..=1000).contains(&max) {
        return Err(SwarmError::validation(
            "rate_limit.max",
            max.to_string(),
            "must be 1..=1000 messages",
        ));
    }
    if !(1..=3600).contains(&window_secs) {
        return Err(SwarmError::validation(
            "rate_limit.window",
            window_secs.to_string(),
            "must be 1..=3600 seconds",
        ));
    }
    Ok((max, window_secs))
}

/// Validate a broadcast recipient list: non-empty, bounded, deduplicated,
/// every entry a valid agent id.
pub fn validate_recipient_list(recipients: &[String]) -> Result<&[String]> {
    if recipients.is_empty() {
        return Err(SwarmError::validation("recipients", "", "must not be empty"));
    }
    if recipients.len() > MAX_RECIPIENTS {
        return Err(SwarmError::validation(
            "recipients",
            recipients.len().to_string(),
            format!("more than {MAX_RECIPIENTS} recipients"),
        ));
    }
    let mut seen = HashSet::new();
    for id in recipients {
        validate_agent_id(id)?;
        if !seen.insert(id.as_str()) {
            return Err(SwarmError::validation("recipients", id, "duplicate recipient"));
        }
    }
    Ok(recipients)
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
