//! Models pertaining to the gateway.

use std::fmt;
use std::num::NonZeroU16;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use super::guild::UnavailableGuild;
use super::id::{GuildId, ShardId, UserId};
use super::user::{OnlineStatus, User};

/// A representation of the data retrieved from the gateway endpoint.
///
/// For the bot-specific gateway, refer to [`BotGateway`].
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct Gateway {
    /// The gateway to connect to.
    pub url: String,
}

/// A representation of the data retrieved from the bot gateway endpoint.
///
/// This is different from the [`Gateway`], as this includes the number of shards that Discord
/// recommends to use for a bot user.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct BotGateway {
    /// Information describing how many gateway sessions you can initiate within a ratelimit
    /// period.
    pub session_start_limit: SessionStartLimit,
    /// The number of shards that is recommended to be used by the current bot user.
    pub shards: NonZeroU16,
    /// The gateway to connect to.
    pub url: String,
}

/// Information describing how many gateway sessions you can initiate within a ratelimit period.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct SessionStartLimit {
    /// The number of sessions that you can still initiate within the current ratelimit period.
    pub remaining: u64,
    /// The number of milliseconds until the ratelimit period resets.
    pub reset_after: u64,
    /// The total number of session starts within the ratelimit period allowed.
    pub total: u64,
    /// The number of identify requests allowed per 5 seconds.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: NonZeroU16,
}

fn default_max_concurrency() -> NonZeroU16 {
    NonZeroU16::MIN
}

/// Identifying information about a [`Shard`], carried by every identify: which shard this is out
/// of how many total.
///
/// Serializes as the two-element `[id, total]` array the gateway expects.
///
/// [`Shard`]: crate::gateway::Shard
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ShardInfo {
    pub id: ShardId,
    pub total: NonZeroU16,
}

impl ShardInfo {
    #[must_use]
    pub(crate) fn new(id: ShardId, total: NonZeroU16) -> Self {
        Self {
            id,
            total,
        }
    }
}

impl fmt::Display for ShardInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}]", self.id.0, self.total)
    }
}

impl Serialize for ShardInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.id.0, self.total.get()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ShardInfo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (id, total) = <(u16, u16)>::deserialize(deserializer)?;
        let total = NonZeroU16::new(total)
            .ok_or_else(|| DeError::custom("a shard total of zero is out of range"))?;

        Ok(Self::new(ShardId(id), total))
    }
}

/// The data for the READY dispatch, establishing a gateway session.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct Ready {
    /// The gateway version negotiated with the server.
    #[serde(rename = "v")]
    pub version: u8,
    /// Information about the current user.
    pub user: User,
    /// The guilds the user is in, all unavailable at this point.
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
    /// The id of the established session, used for resuming.
    pub session_id: String,
    /// The URL resumes should connect to instead of the configured gateway URL.
    pub resume_gateway_url: String,
    /// The shard info tied to the session, if the session was started sharded.
    #[serde(default)]
    pub shard: Option<ShardInfo>,
}

/// A user pointer within a [`Presence`]. Only the id is guaranteed to be present.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct PresenceUser {
    pub id: UserId,
}

/// Presence data of a user, as received over the gateway.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct Presence {
    /// The user whose presence this is.
    pub user: PresenceUser,
    /// The guild the presence applies in.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// The user's online status.
    pub status: OnlineStatus,
    /// The activities of the user.
    #[serde(default)]
    pub activities: Vec<Activity>,
}

enum_number! {
    /// The type of an [`Activity`].
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
    #[serde(from = "u8", into = "u8")]
    #[non_exhaustive]
    pub enum ActivityType {
        /// An indicator that the user is playing a game.
        #[default]
        Playing = 0,
        /// An indicator that the user is streaming to a service.
        Streaming = 1,
        /// An indicator that the user is listening to something.
        Listening = 2,
        /// An indicator that the user is watching something.
        Watching = 3,
        /// An indicator that the user uses custom statuses.
        Custom = 4,
        /// An indicator that the user is competing somewhere.
        Competing = 5,
        _ => Unknown(u8),
    }
}

/// Representation of an activity that a user is performing, as received within a [`Presence`].
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct Activity {
    /// The name of the activity.
    pub name: String,
    /// The type of the activity.
    #[serde(rename = "type")]
    pub kind: ActivityType,
    /// The state of the activity, if the type is [`ActivityType::Custom`].
    #[serde(default)]
    pub state: Option<String>,
    /// The Stream URL if [`Self::kind`] is [`ActivityType::Streaming`].
    #[serde(default)]
    pub url: Option<Url>,
}

bitflags! {
    /// [Gateway Intents] will limit the events your bot will receive via the gateway. By default,
    /// all intents except [Privileged Intents] are selected.
    ///
    /// [Gateway Intents]: https://discord.com/developers/docs/topics/gateway#gateway-intents
    /// [Privileged Intents]: https://discord.com/developers/docs/topics/gateway#privileged-intents
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct GatewayIntents: u64 {
        /// Enables the following gateway events: GUILD_CREATE, GUILD_UPDATE, GUILD_DELETE,
        /// GUILD_ROLE_CREATE, GUILD_ROLE_UPDATE, GUILD_ROLE_DELETE, CHANNEL_CREATE,
        /// CHANNEL_UPDATE, CHANNEL_DELETE.
        const GUILDS = 1 << 0;
        /// Enables the following gateway events: GUILD_MEMBER_ADD, GUILD_MEMBER_UPDATE,
        /// GUILD_MEMBER_REMOVE.
        ///
        /// **Info**: This intent is *privileged*. It must be enabled in the developer portal.
        const GUILD_MEMBERS = 1 << 1;
        /// Enables moderation-related gateway events.
        const GUILD_MODERATION = 1 << 2;
        /// Enables emoji and sticker update events.
        const GUILD_EMOJIS_AND_STICKERS = 1 << 3;
        /// Enables integration update events.
        const GUILD_INTEGRATIONS = 1 << 4;
        /// Enables the WEBHOOKS_UPDATE gateway event.
        const GUILD_WEBHOOKS = 1 << 5;
        /// Enables the following gateway events: INVITE_CREATE, INVITE_DELETE.
        const GUILD_INVITES = 1 << 6;
        /// Enables the VOICE_STATE_UPDATE gateway event.
        const GUILD_VOICE_STATES = 1 << 7;
        /// Enables the PRESENCE_UPDATE gateway event.
        ///
        /// **Info**: This intent is *privileged*. It must be enabled in the developer portal.
        const GUILD_PRESENCES = 1 << 8;
        /// Enables the following gateway events in guilds: MESSAGE_CREATE, MESSAGE_UPDATE,
        /// MESSAGE_DELETE.
        const GUILD_MESSAGES = 1 << 9;
        /// Enables the following gateway events in guilds: MESSAGE_REACTION_ADD,
        /// MESSAGE_REACTION_REMOVE, MESSAGE_REACTION_REMOVE_ALL.
        const GUILD_MESSAGE_REACTIONS = 1 << 10;
        /// Enables the TYPING_START gateway event in guilds.
        const GUILD_MESSAGE_TYPING = 1 << 11;
        /// Enables message events in direct messages.
        const DIRECT_MESSAGES = 1 << 12;
        /// Enables reaction events in direct messages.
        const DIRECT_MESSAGE_REACTIONS = 1 << 13;
        /// Enables the TYPING_START gateway event in direct messages.
        const DIRECT_MESSAGE_TYPING = 1 << 14;
        /// Enables receiving the content of messages not addressed to the bot.
        ///
        /// **Info**: This intent is *privileged*. It must be enabled in the developer portal.
        const MESSAGE_CONTENT = 1 << 15;
        /// Enables scheduled event updates.
        const GUILD_SCHEDULED_EVENTS = 1 << 16;
        /// Enables auto moderation configuration events.
        const AUTO_MODERATION_CONFIGURATION = 1 << 20;
        /// Enables auto moderation execution events.
        const AUTO_MODERATION_EXECUTION = 1 << 21;
    }
}

impl GatewayIntents {
    /// Gets all of the intents that aren't considered privileged by Discord.
    #[must_use]
    pub const fn non_privileged() -> GatewayIntents {
        // bitflags don't support const evaluation. Workaround.
        // See: https://github.com/bitflags/bitflags/issues/180
        Self::privileged().complement()
    }

    /// Gets all of the intents that are considered privileged by Discord.
    ///
    /// These must be enabled in the developer portal before identifying with them.
    #[must_use]
    pub const fn privileged() -> GatewayIntents {
        Self::GUILD_MEMBERS.union(Self::GUILD_PRESENCES).union(Self::MESSAGE_CONTENT)
    }

    /// Checks if any of the included intents are privileged.
    #[must_use]
    pub const fn is_privileged(self) -> bool {
        self.intersects(Self::privileged())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_info_wire_format() {
        let info = ShardInfo::new(ShardId(1), NonZeroU16::new(3).unwrap());
        assert_eq!(serde_json::to_string(&info).unwrap(), "[1,3]");

        let back: ShardInfo = serde_json::from_str("[1,3]").unwrap();
        assert_eq!(back, info);

        assert!(serde_json::from_str::<ShardInfo>("[1,0]").is_err());
    }

    #[test]
    fn intents_serialize_as_bits() {
        let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES;
        assert_eq!(serde_json::to_string(&intents).unwrap(), "513");

        let back: GatewayIntents = serde_json::from_str("513").unwrap();
        assert_eq!(back, intents);
    }

    #[test]
    fn privileged_intents_are_excluded_from_non_privileged() {
        assert!(!GatewayIntents::non_privileged().contains(GatewayIntents::GUILD_PRESENCES));
        assert!(!GatewayIntents::non_privileged().contains(GatewayIntents::MESSAGE_CONTENT));
        assert!(GatewayIntents::non_privileged().contains(GatewayIntents::GUILDS));
        assert!(GatewayIntents::GUILD_MEMBERS.is_privileged());
    }

    #[test]
    fn session_start_limit_defaults_max_concurrency() {
        let json = r#"{"total":1000,"remaining":999,"reset_after":14400000}"#;
        let limit: SessionStartLimit = serde_json::from_str(json).unwrap();
        assert_eq!(limit.max_concurrency.get(), 1);
    }
}
