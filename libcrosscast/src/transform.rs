//! Pre-publish content transforms
//!
//! Platform constraints are applied by deterministic transforms instead
//! of rejections: truncating one platform's copy is preferable to
//! blocking a multi-platform broadcast on that platform's limit.
//! Everything here is a pure function.

use crate::error::{PlatformError, Result};
use crate::types::Platform;

/// Marker appended when content is truncated to fit a platform limit.
pub const TRUNCATION_MARKER: char = '…';

/// Reject locally-invalid drafts before anything is sent upstream.
pub fn validate_draft(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(PlatformError::Validation("Content cannot be empty".to_string()).into());
    }
    Ok(())
}

/// Fit `content` to `platform`'s character ceiling.
///
/// Content at or under the limit passes through untouched. Over-limit
/// content is cut at a character boundary to limit-1 characters and the
/// truncation marker is appended, so the result is always exactly the
/// limit. Same input, same output, every time.
pub fn render_for_platform(content: &str, platform: Platform) -> String {
    let Some(limit) = platform.character_limit() else {
        return content.to_string();
    };

    if content.chars().count() <= limit {
        return content.to_string();
    }

    let mut truncated: String = content.chars().take(limit - 1).collect();
    truncated.push(TRUNCATION_MARKER);
    truncated
}

/// Extract `#hashtags` from content, in order of first appearance,
/// without the leading marker.
pub fn extract_hashtags(content: &str) -> Vec<String> {
    extract_tagged(content, '#')
}

/// Extract `@mentions` from content, in order of first appearance,
/// without the leading marker.
pub fn extract_mentions(content: &str) -> Vec<String> {
    extract_tagged(content, '@')
}

fn extract_tagged(content: &str, marker: char) -> Vec<String> {
    let mut found = Vec::new();
    let mut chars = content.chars().peekable();
    let mut prev: Option<char> = None;

    while let Some(c) = chars.next() {
        let boundary = prev.is_none_or(|p| !p.is_alphanumeric());
        if c == marker && boundary {
            let tag: String = {
                let mut tag = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' {
                        tag.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tag
            };
            if !tag.is_empty() && !found.contains(&tag) {
                found.push(tag);
            }
            prev = Some(' ');
        } else {
            prev = Some(c);
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_content_untouched() {
        let content = "hello world";
        assert_eq!(render_for_platform(content, Platform::Twitter), content);
    }

    #[test]
    fn test_content_at_limit_untouched() {
        let content = "x".repeat(280);
        assert_eq!(render_for_platform(&content, Platform::Twitter), content);
    }

    #[test]
    fn test_over_limit_truncated_with_marker() {
        let content = format!("hello {}", "x".repeat(300));
        let rendered = render_for_platform(&content, Platform::Twitter);

        assert_eq!(rendered.chars().count(), 280);
        assert!(rendered.ends_with(TRUNCATION_MARKER));
        assert!(rendered.starts_with("hello "));
    }

    #[test]
    fn test_truncation_is_deterministic() {
        let content = "y".repeat(500);
        let first = render_for_platform(&content, Platform::Twitter);
        let second = render_for_platform(&content, Platform::Twitter);
        assert_eq!(first, second);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        // Multi-byte characters must not be split.
        let content = "é".repeat(400);
        let rendered = render_for_platform(&content, Platform::Twitter);
        assert_eq!(rendered.chars().count(), 280);
        assert!(rendered.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_no_limit_platform_passes_through() {
        let content = "z".repeat(5000);
        assert_eq!(render_for_platform(&content, Platform::Facebook), content);
    }

    #[test]
    fn test_validate_draft_rejects_empty() {
        assert!(validate_draft("").is_err());
        assert!(validate_draft("   ").is_err());
        assert!(validate_draft("ok").is_ok());
    }

    #[test]
    fn test_extract_hashtags() {
        let content = "Launching #rust tooling for #analytics. More #rust soon.";
        assert_eq!(extract_hashtags(content), vec!["rust", "analytics"]);
    }

    #[test]
    fn test_extract_mentions() {
        let content = "Thanks @alice and @bob_dev! email@example.com is not a mention";
        assert_eq!(extract_mentions(content), vec!["alice", "bob_dev"]);
    }

    #[test]
    fn test_extract_empty() {
        assert!(extract_hashtags("no tags here").is_empty());
        assert!(extract_mentions("# @ lone markers").is_empty());
    }
}
