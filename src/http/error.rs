use std::error::Error as StdError;
use std::fmt;

use reqwest::header::InvalidHeaderValue;
use reqwest::{Error as ReqwestError, StatusCode};

/// An HTTP error.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// When a non-successful status code was received for a request.
    UnsuccessfulRequest {
        /// The status code of the response.
        status: StatusCode,
        /// The URL the request was made to.
        url: String,
    },
    /// When the token provided is in an invalid format.
    InvalidToken,
    /// An error from the `reqwest` crate.
    Request(ReqwestError),
    /// When building a request's headers failed.
    InvalidHeader(InvalidHeaderValue),
}

impl From<ReqwestError> for Error {
    fn from(error: ReqwestError) -> Self {
        Self::Request(error)
    }
}

impl From<InvalidHeaderValue> for Error {
    fn from(error: InvalidHeaderValue) -> Self {
        Self::InvalidHeader(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsuccessfulRequest {
                status,
                url,
            } => {
                write!(f, "Request to {url} failed with status {status}")
            },
            Self::InvalidToken => f.write_str("The provided token was invalid"),
            Self::Request(inner) => fmt::Display::fmt(&inner, f),
            Self::InvalidHeader(inner) => fmt::Display::fmt(&inner, f),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Request(inner) => Some(inner),
            Self::InvalidHeader(inner) => Some(inner),
            _ => None,
        }
    }
}
