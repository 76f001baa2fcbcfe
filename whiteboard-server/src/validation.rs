//! Input validation for untrusted data.
//!
//! Everything a client sends is checked here before it reaches a session.

use thiserror::Error;
use whiteboard_core::{is_valid_session_id, MAX_SESSION_ID_LEN};

/// Default maximum WebSocket message size.
pub const MAX_WS_MESSAGE_SIZE: usize = 1_048_576; // 1MB

/// Validation error types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Session ID exceeds maximum length.
    #[error("session_id too long (max {MAX_SESSION_ID_LEN} chars)")]
    SessionIdTooLong,
    /// Session ID is empty or contains invalid characters.
    #[error("session_id contains invalid characters")]
    SessionIdInvalidChars,
    /// WebSocket message exceeds the configured maximum.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge {
        /// Received size in bytes.
        size: usize,
        /// Configured limit in bytes.
        max: usize,
    },
}

impl ValidationError {
    /// Short label used for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionIdTooLong | Self::SessionIdInvalidChars => "session_id",
            Self::MessageTooLarge { .. } => "message_size",
        }
    }
}

/// Validate a session ID against [`is_valid_session_id`], naming what
/// was wrong with it.
///
/// # Errors
///
/// Returns [`ValidationError::SessionIdTooLong`] if the ID exceeds 64 characters.
/// Returns [`ValidationError::SessionIdInvalidChars`] if the ID is empty or contains invalid characters.
pub fn validate_session_id(id: &str) -> Result<(), ValidationError> {
    if is_valid_session_id(id) {
        Ok(())
    } else if id.len() > MAX_SESSION_ID_LEN {
        Err(ValidationError::SessionIdTooLong)
    } else {
        Err(ValidationError::SessionIdInvalidChars)
    }
}

/// Validate WebSocket message size against `max`.
///
/// # Errors
///
/// Returns [`ValidationError::MessageTooLarge`] if the message exceeds `max` bytes.
pub fn validate_message_size(size: usize, max: usize) -> Result<(), ValidationError> {
    if size > max {
        return Err(ValidationError::MessageTooLarge { size, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_session_ids() {
        assert!(validate_session_id("room").is_ok());
        assert!(validate_session_id("my-session").is_ok());
        assert!(validate_session_id("session_123").is_ok());
        assert!(validate_session_id("a").is_ok());
        assert!(validate_session_id("4f9c2e7d0b1a4c3e8f6d5a2b1c0e9f8a").is_ok());
    }

    #[test]
    fn test_invalid_session_ids() {
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("has spaces").is_err());
        assert!(validate_session_id("has/slash").is_err());
        assert!(validate_session_id("../../../etc/passwd").is_err());
        assert!(validate_session_id("contains<script>").is_err());
        assert!(validate_session_id("caf\u{e9}").is_err());
    }

    #[test]
    fn test_session_id_boundary() {
        let at_limit = "x".repeat(MAX_SESSION_ID_LEN);
        assert!(validate_session_id(&at_limit).is_ok());

        let over_limit = "x".repeat(MAX_SESSION_ID_LEN + 1);
        assert_eq!(
            validate_session_id(&over_limit),
            Err(ValidationError::SessionIdTooLong)
        );
    }

    #[test]
    fn test_message_size() {
        assert!(validate_message_size(1000, MAX_WS_MESSAGE_SIZE).is_ok());
        assert!(validate_message_size(MAX_WS_MESSAGE_SIZE, MAX_WS_MESSAGE_SIZE).is_ok());
        assert_eq!(
            validate_message_size(11, 10),
            Err(ValidationError::MessageTooLarge { size: 11, max: 10 })
        );
    }

    #[test]
    fn test_error_messages() {
        let err = ValidationError::SessionIdTooLong;
        assert!(err.to_string().contains("64"));
        assert_eq!(err.kind(), "session_id");

        let err = ValidationError::MessageTooLarge {
            size: 2_000_000,
            max: MAX_WS_MESSAGE_SIZE,
        };
        assert!(err.to_string().contains("1048576"));
        assert_eq!(err.kind(), "message_size");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_validation_agrees_with_join_rule(id in "[A-Za-z0-9_/ .-]{0,80}") {
                prop_assert_eq!(validate_session_id(&id).is_ok(), is_valid_session_id(&id));
            }
        }
    }
}
