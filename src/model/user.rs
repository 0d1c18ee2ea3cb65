//! Models about users of Discord.

use serde::{Deserialize, Serialize};

use super::id::UserId;

/// Information about a user.
///
/// Only the subset of fields the gateway client itself needs is modelled; unknown fields in
/// payloads are ignored.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct User {
    /// The unique Id of the user.
    pub id: UserId,
    /// The account's username.
    #[serde(rename = "username")]
    pub name: String,
    /// The account's display name, if set.
    #[serde(default)]
    pub global_name: Option<String>,
    /// Indicator of whether the user is a bot.
    #[serde(default)]
    pub bot: bool,
}

/// The representation of a user's status, such as online or invisible.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[non_exhaustive]
pub enum OnlineStatus {
    #[serde(rename = "dnd")]
    DoNotDisturb,
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "invisible")]
    Invisible,
    #[serde(rename = "offline")]
    Offline,
    #[default]
    #[serde(rename = "online")]
    Online,
}

impl OnlineStatus {
    #[must_use]
    pub fn name(&self) -> &str {
        match *self {
            OnlineStatus::DoNotDisturb => "dnd",
            OnlineStatus::Idle => "idle",
            OnlineStatus::Invisible => "invisible",
            OnlineStatus::Offline => "offline",
            OnlineStatus::Online => "online",
        }
    }
}
