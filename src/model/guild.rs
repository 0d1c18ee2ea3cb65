//! Models relating to guilds and types that it owns.

use serde::{Deserialize, Serialize};

use super::id::{ChannelId, GuildId, RoleId, UserId};
use super::user::User;

/// Partial information about a guild. This does not include a full set of fields, only what the
/// gateway client needs to route and identify traffic.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct Guild {
    /// The unique Id identifying the guild.
    pub id: GuildId,
    /// The name of the guild.
    #[serde(default)]
    pub name: String,
    /// Whether the guild is unavailable due to an outage.
    #[serde(default)]
    pub unavailable: bool,
    /// The number of members in the guild, sent on GUILD_CREATE.
    #[serde(default)]
    pub member_count: Option<u64>,
}

/// Data for an unavailable guild, as received on GUILD_DELETE or within the Ready payload.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct UnavailableGuild {
    /// The unique Id of the guild.
    pub id: GuildId,
    /// Whether the guild is unavailable. This is `false` when the user was removed from the
    /// guild instead.
    #[serde(default)]
    pub unavailable: bool,
}

/// Information about a member of a guild.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct Member {
    /// Attached user information.
    pub user: User,
    /// The guild the member is in, present on GUILD_MEMBER_ADD.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// The member's nickname, if present.
    #[serde(default)]
    pub nick: Option<String>,
    /// Vector of Ids of [`Role`]s given to the member.
    #[serde(default)]
    pub roles: Vec<RoleId>,
    /// Timestamp representing the date when the member joined.
    #[serde(default)]
    pub joined_at: Option<String>,
}

/// Information about a role within a guild.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct Role {
    /// The Id of the role.
    pub id: RoleId,
    /// The name of the role.
    pub name: String,
    /// The position of the role in the role list.
    #[serde(default)]
    pub position: i64,
}

/// A member's state within a voice channel.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct VoiceState {
    /// The Id of the user tied to the state.
    pub user_id: UserId,
    /// The guild the state applies in.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// The channel the user is connected to, `None` when disconnecting.
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    /// The session id tied to the voice connection.
    pub session_id: String,
}
