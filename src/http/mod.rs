//! The HTTP module which provides functions for performing the requests the gateway needs.
//!
//! The gateway client consumes a single endpoint family: `GET /gateway` and `GET /gateway/bot`,
//! the latter returning the recommended shard count and the session start limit that gates
//! identify scheduling.

mod client;
mod error;

pub use self::client::Http;
pub use self::error::Error as HttpError;
use crate::internal::prelude::*;

/// Validates that a token is likely in a valid format.
///
/// This performs the following checks on a given token:
/// - Is not empty;
/// - Contains 3 parts (split by the period char `'.'`).
///
/// # Errors
///
/// Returns [`HttpError::InvalidToken`] if the token does not pass the above checks.
pub fn validate_token(token: &str) -> Result<()> {
    if !token.is_empty() && token.split('.').filter(|part| !part.is_empty()).count() == 3 {
        Ok(())
    } else {
        Err(Error::Http(HttpError::InvalidToken))
    }
}

#[cfg(test)]
mod tests {
    use super::validate_token;

    #[test]
    fn token_validation() {
        assert!(validate_token("MTAwMDAwMDAwMDAwMDAwMDAw.XXXXXX.ZZZZZZZZZZZZZZZZZZ").is_ok());
        assert!(validate_token("").is_err());
        assert!(validate_token("missing.parts").is_err());
        assert!(validate_token("trailing.empty.").is_err());
    }
}
