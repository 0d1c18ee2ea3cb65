//! Contains the necessary plumbing for maintaining a connection with Discord.
//!
//! The primary building blocks are the [`Shard`] and the [`ShardManager`].
//!
//! A [`Shard`] is a low-level receiver and sender representing a single connection to Discord's
//! gateway. The [`ShardManager`] owns a fleet of them, running each inside its own task behind a
//! [`ShardRunner`], admits their identifies through a serialized queue, and fans their dispatches
//! in to subscribers. The [`Client`] drives the manager for you, so you should only care about
//! using these directly if you really need to.
//!
//! [`Client`]: crate::client::Client

mod error;
mod ratelimiter;
pub mod sharding;
mod shard;
mod ws;

use std::env::consts;

use serde::Serialize;
use url::Url;

pub use self::error::Error as GatewayError;
pub use self::ratelimiter::PayloadRatelimiter;
pub(crate) use self::shard::fatal_close_error;
pub use self::shard::{ConnectionStage, ReconnectType, Shard, ShardAction, ShardOptions};
pub use self::sharding::*;
pub use self::ws::WsClient;
use crate::internal::prelude::*;
use crate::model::gateway::ActivityType;
use crate::model::id::UserId;
use crate::model::user::OnlineStatus;

/// Presence data of the current user.
#[derive(Clone, Debug, Default)]
pub struct PresenceData {
    /// The current activity, if present
    pub activity: Option<ActivityData>,
    /// The current online status
    pub status: OnlineStatus,
}

/// Activity data of the current user.
#[derive(Clone, Debug, Serialize)]
pub struct ActivityData {
    /// The name of the activity
    pub name: String,
    /// The type of the activity
    #[serde(rename = "type")]
    pub kind: ActivityType,
    /// The state of the activity, if the type is [`ActivityType::Custom`]
    pub state: Option<String>,
    /// The url of the activity, if the type is [`ActivityType::Streaming`]
    pub url: Option<Url>,
}

impl ActivityData {
    /// Creates an activity that appears as `Playing <name>`.
    #[must_use]
    pub fn playing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ActivityType::Playing,
            state: None,
            url: None,
        }
    }

    /// Creates an activity that appears as `Streaming <name>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL parsing fails.
    pub fn streaming(name: impl Into<String>, url: &str) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            kind: ActivityType::Streaming,
            state: None,
            url: Some(Url::parse(url).map_err(|why| Error::Url(why.to_string()))?),
        })
    }

    /// Creates an activity that appears as `Listening to <name>`.
    #[must_use]
    pub fn listening(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ActivityType::Listening,
            state: None,
            url: None,
        }
    }

    /// Creates an activity that appears as `Watching <name>`.
    #[must_use]
    pub fn watching(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ActivityType::Watching,
            state: None,
            url: None,
        }
    }

    /// Creates an activity that appears as `Competing in <name>`.
    #[must_use]
    pub fn competing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ActivityType::Competing,
            state: None,
            url: None,
        }
    }

    /// Creates an activity that appears as `<state>`.
    #[must_use]
    pub fn custom(state: impl Into<String>) -> Self {
        Self {
            // discord seems to require a name for custom activities
            // even though it's not displayed
            name: "~".to_string(),
            kind: ActivityType::Custom,
            state: Some(state.into()),
            url: None,
        }
    }
}

/// The properties sent along with every identify, describing the connecting client.
#[derive(Clone, Debug, Serialize)]
pub struct IdentifyProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self {
            os: consts::OS.to_string(),
            browser: "tempest".to_string(),
            device: "tempest".to_string(),
        }
    }
}

/// A snapshot of an established gateway session: the cursor the server keeps for us, identified
/// by its id and the last delivered sequence number.
///
/// While a session exists it is resumable; it is dropped by an explicit server signal or a
/// non-resumable close.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Session {
    /// The id of the session, as established by the Ready dispatch.
    pub session_id: String,
    /// The sequence number of the last numbered payload received.
    pub seq: u64,
}

/// [Discord docs](https://discord.com/developers/docs/topics/gateway-events#request-guild-members).
#[derive(Clone, Debug)]
pub enum ChunkGuildFilter {
    /// Returns all members of the guilds specified. Requires GUILD_MEMBERS intent.
    None,
    /// A common username prefix filter for the members returned.
    ///
    /// Will return a maximum of 100 members.
    Query(String),
    /// A set of exact user IDs to query for.
    ///
    /// Will return a maximum of 100 members.
    UserIds(Vec<UserId>),
}
