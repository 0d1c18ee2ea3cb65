use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::Client;
use secrecy::SecretString;
use tracing::debug;

use super::HttpError;
use crate::constants;
use crate::internal::prelude::*;
use crate::model::gateway::{BotGateway, Gateway};

/// A low-level client for performing the REST requests the gateway client needs.
///
/// Only the gateway metadata endpoints are implemented; general API coverage is out of scope for
/// this library.
pub struct Http {
    client: Client,
    token: SecretString,
}

impl Http {
    /// Creates a client with the given bot token.
    ///
    /// An eventual `Bot ` prefix on the token is tolerated.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::InvalidToken`] if the token is not in a valid format, or an error if
    /// the underlying client could not be built.
    pub fn new(token: &str) -> Result<Self> {
        let token = token.trim().trim_start_matches("Bot ").to_string();
        super::validate_token(&token)?;

        let mut headers = HeaderMap::new();
        let mut auth =
            HeaderValue::try_from(format!("Bot {token}")).map_err(HttpError::InvalidHeader)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(USER_AGENT, HeaderValue::from_static(constants::USER_AGENT));

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(HttpError::Request)?;

        Ok(Self {
            client,
            token: SecretString::new(token),
        })
    }

    /// The configured token, without the `Bot ` prefix.
    #[must_use]
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    /// Gets the gateway URL without authentication information.
    ///
    /// # Errors
    ///
    /// Errors if the request fails or returns a non-success status.
    pub async fn get_gateway(&self) -> Result<Gateway> {
        self.fire(api!("/gateway")).await
    }

    /// Gets the current bot gateway information, including the recommended shard count and the
    /// session start limit.
    ///
    /// # Errors
    ///
    /// Errors if the request fails or returns a non-success status.
    pub async fn get_bot_gateway(&self) -> Result<BotGateway> {
        self.fire(api!("/gateway/bot")).await
    }

    async fn fire<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET {url}");

        let response = self.client.get(url).send().await.map_err(HttpError::Request)?;

        if !response.status().is_success() {
            return Err(Error::Http(HttpError::UnsuccessfulRequest {
                status: response.status(),
                url: url.to_string(),
            }));
        }

        Ok(response.json().await.map_err(HttpError::Request)?)
    }
}

impl std::fmt::Debug for Http {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The token is intentionally absent here; it must never leak into logs.
        f.debug_struct("Http").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::Http;

    #[test]
    fn bot_prefix_is_stripped() {
        let http = Http::new("Bot MTAwMDAwMDAwMDAwMDAwMDAw.XXXXXX.ZZZZZZZZZZZZZZZZZZ").unwrap();
        assert!(!http.token().expose_secret().starts_with("Bot "));
    }

    #[test]
    fn debug_output_redacts_the_token() {
        let http = Http::new("MTAwMDAwMDAwMDAwMDAwMDAw.XXXXXX.ZZZZZZZZZZZZZZZZZZ").unwrap();
        let output = format!("{http:?}");
        assert!(!output.contains("MTAwMDAwMDAw"));
    }
}
