//! Caller-supplied base names for rendered artifacts.

use crate::{Error, Result};

/// Longest accepted base name, in characters, before any prefixing.
pub const MAX_FILENAME_LENGTH: usize = 50;

/// Device names Windows refuses as file names (compared case-insensitively).
const RESERVED_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Prefix applied to names that would otherwise start like a command-line flag.
const FLAG_SAFE_PREFIX: &str = "file_";

/// Validate and normalize a caller-supplied base name.
///
/// The name is trimmed and its last extension dropped. What remains must be
/// 1 to 50 characters of `[A-Za-z0-9_-]` and must not be a reserved device
/// name. Names starting with `-` or `_` get a `file_` prefix so they can be
/// passed to the renderer safely.
///
/// ```
/// use manim_render::safety::validate_filename;
///
/// assert_eq!(validate_filename(" circle.py ").unwrap(), "circle");
/// assert_eq!(validate_filename("-intro").unwrap(), "file_-intro");
/// assert!(validate_filename("CON").is_err());
/// ```
pub fn validate_filename(input: &str) -> Result<String> {
    if input.is_empty() {
        return Err(Error::validation("Filename cannot be empty"));
    }

    let trimmed = input.trim();
    let name = match trimmed.rfind('.') {
        Some(dot) => &trimmed[..dot],
        None => trimmed,
    };

    if name.is_empty() {
        return Err(Error::validation("Filename must have content"));
    }
    if name.chars().count() > MAX_FILENAME_LENGTH {
        return Err(Error::validation(format!(
            "Filename must be no more than {MAX_FILENAME_LENGTH} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::validation(
            "Filename can only contain letters, numbers, underscores, and hyphens",
        ));
    }

    let lower = name.to_ascii_lowercase();
    if RESERVED_NAMES.contains(&lower.as_str()) {
        return Err(Error::validation(format!(
            "Filename '{name}' is reserved and cannot be used"
        )));
    }

    if name.starts_with(['-', '_']) {
        return Ok(format!("{FLAG_SAFE_PREFIX}{name}"));
    }

    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejection(input: &str) -> String {
        match validate_filename(input) {
            Err(Error::Validation(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_strips_whitespace_and_extension() {
        assert_eq!(validate_filename("  circle  ").unwrap(), "circle");
        assert_eq!(validate_filename("circle.py").unwrap(), "circle");
    }

    #[test]
    fn test_only_last_extension_is_removed() {
        // The remaining dot then fails the charset check.
        assert_eq!(
            rejection("a.b.c"),
            "Filename can only contain letters, numbers, underscores, and hyphens"
        );
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(rejection(""), "Filename cannot be empty");
        assert_eq!(rejection("   "), "Filename must have content");
        assert_eq!(rejection(".py"), "Filename must have content");
    }

    #[test]
    fn test_length_limit() {
        let fifty = "a".repeat(MAX_FILENAME_LENGTH);
        assert_eq!(validate_filename(&fifty).unwrap(), fifty);

        let too_long = "a".repeat(MAX_FILENAME_LENGTH + 1);
        assert_eq!(
            rejection(&too_long),
            "Filename must be no more than 50 characters"
        );
    }

    #[test]
    fn test_charset() {
        assert!(validate_filename("My_Scene-2").is_ok());
        assert!(validate_filename("../etc/passwd").is_err());
        assert!(validate_filename("hello world").is_err());
        assert!(validate_filename("观看").is_err());
    }

    #[test]
    fn test_reserved_names() {
        assert_eq!(
            rejection("CON"),
            "Filename 'CON' is reserved and cannot be used"
        );
        assert!(validate_filename("nul.txt").is_err());
        assert!(validate_filename("Lpt9").is_err());
        assert!(validate_filename("console").is_ok());
    }

    #[test]
    fn test_flag_like_names_are_prefixed() {
        assert_eq!(validate_filename("-rf").unwrap(), "file_-rf");
        assert_eq!(validate_filename("_hidden").unwrap(), "file__hidden");
    }
}
