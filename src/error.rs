use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;

use serde_json::Error as JsonError;
use tokio_tungstenite::tungstenite::error::Error as TungsteniteError;

use crate::gateway::GatewayError;
use crate::http::HttpError;
use crate::internal::prelude::*;

/// The common result type between most library functions.
///
/// The library exposes functions which, for a result type, exposes only one type, rather than the
/// usual 2 (`Result<T, Error>`). This is because all functions that return a result return
/// the library's [`Error`], so this is implied, and a "simpler" result is used.
pub type Result<T> = StdResult<T, Error>;

/// A common error enum returned by most of the library's functionality within a custom [`Result`].
///
/// The most common error types, the [`GatewayError`] and [`HttpError`] enums, are both wrapped
/// around this in the form of the [`Self::Gateway`] and [`Self::Http`] variants.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An error while decoding a payload.
    Decode(&'static str, Value),
    /// Some other error. This is only used for "Expected value <TYPE>" errors, when a more
    /// detailed error can not be easily provided.
    Other(&'static str),
    /// An `std::io` error.
    Io(IoError),
    /// An error from the `serde_json` crate.
    Json(JsonError),
    /// An error from the `url` crate.
    Url(String),
    /// An error from the gateway module.
    Gateway(GatewayError),
    /// An error from the http module.
    Http(HttpError),
    /// An error from the `tungstenite` crate.
    Tungstenite(Box<TungsteniteError>),
}

impl From<GatewayError> for Error {
    fn from(e: GatewayError) -> Self {
        Self::Gateway(e)
    }
}

impl From<HttpError> for Error {
    fn from(e: HttpError) -> Self {
        Self::Http(e)
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Self::Io(e)
    }
}

impl From<JsonError> for Error {
    fn from(e: JsonError) -> Self {
        Self::Json(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(HttpError::Request(e))
    }
}

impl From<TungsteniteError> for Error {
    fn from(e: TungsteniteError) -> Self {
        Self::Tungstenite(Box::new(e))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(msg, _) => f.write_str(msg),
            Self::Other(msg) => f.write_str(msg),
            Self::Io(inner) => fmt::Display::fmt(&inner, f),
            Self::Json(inner) => fmt::Display::fmt(&inner, f),
            Self::Url(msg) => f.write_str(msg),
            Self::Gateway(inner) => fmt::Display::fmt(&inner, f),
            Self::Http(inner) => fmt::Display::fmt(&inner, f),
            Self::Tungstenite(inner) => fmt::Display::fmt(&inner, f),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io(inner) => Some(inner),
            Self::Json(inner) => Some(inner),
            Self::Gateway(inner) => Some(inner),
            Self::Http(inner) => Some(inner),
            Self::Tungstenite(inner) => Some(inner),
            _ => None,
        }
    }
}
