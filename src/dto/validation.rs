//! Validation helpers for DTOs.

use validator::ValidationError;

/// Maximum length, in characters, of chat messages and contact request notes.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Validates that a chat message is not blank and fits [`MAX_MESSAGE_LENGTH`].
///
/// # Examples
///
/// ```ignore
/// validate_message_content("gg, want to duo?") // Ok
/// validate_message_content("   ")              // Err - blank
/// ```
pub fn validate_message_content(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        let mut err = ValidationError::new("message_blank");
        err.message = Some("Message must not be empty".into());
        return Err(err);
    }

    let length = content.chars().count();
    if length > MAX_MESSAGE_LENGTH {
        let mut err = ValidationError::new("message_length");
        err.message = Some(
            format!("Message must be at most {MAX_MESSAGE_LENGTH} characters (got {length})")
                .into(),
        );
        return Err(err);
    }

    Ok(())
}

/// Normalizes an optional note: blank notes count as absent.
pub fn normalize_optional_text(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_message_content_valid() {
        assert!(validate_message_content("hi").is_ok());
        assert!(validate_message_content(&"a".repeat(MAX_MESSAGE_LENGTH)).is_ok());
        // multi-byte characters count once
        assert!(validate_message_content(&"é".repeat(MAX_MESSAGE_LENGTH)).is_ok());
    }

    #[test]
    fn test_validate_message_content_invalid() {
        assert!(validate_message_content("").is_err());
        assert!(validate_message_content(" \n\t").is_err());
        assert!(validate_message_content(&"a".repeat(MAX_MESSAGE_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_normalize_optional_text() {
        assert_eq!(normalize_optional_text(None), None);
        assert_eq!(normalize_optional_text(Some("  ".into())), None);
        assert_eq!(
            normalize_optional_text(Some("let's scrim".into())),
            Some("let's scrim".into())
        );
    }
}
