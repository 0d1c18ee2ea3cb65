//! Models relating to channels and messages within them.

use serde::{Deserialize, Serialize};

use super::id::{ChannelId, EmojiId, GuildId, MessageId, UserId};
use super::user::User;

enum_number! {
    /// A representation of a type of channel.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
    #[serde(from = "u8", into = "u8")]
    #[non_exhaustive]
    pub enum ChannelType {
        /// An indicator that the channel is a text channel in a guild.
        Text = 0,
        /// An indicator that the channel is a direct message channel.
        Private = 1,
        /// An indicator that the channel is a voice channel in a guild.
        Voice = 2,
        /// An indicator that the channel is a group direct message channel.
        GroupDm = 3,
        /// An indicator that the channel is a channel category.
        Category = 4,
        /// An indicator that the channel is an announcement channel.
        News = 5,
        _ => Unknown(u8),
    }
}

/// Partial information about a channel.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct Channel {
    /// The unique Id of the channel.
    pub id: ChannelId,
    /// The Id of the guild owning the channel, if any.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// The name of the channel, if any.
    #[serde(default)]
    pub name: Option<String>,
    /// The type of the channel.
    #[serde(rename = "type")]
    pub kind: ChannelType,
}

/// A representation of a message over a guild's text channel, a group, or a private channel.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct Message {
    /// The unique Id of the message.
    pub id: MessageId,
    /// The Id of the channel that the message was sent to.
    pub channel_id: ChannelId,
    /// The Id of the guild that the message was sent in, if there is one.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// The user that sent the message.
    pub author: User,
    /// The content of the message.
    #[serde(default)]
    pub content: String,
    /// Initial message creation timestamp, calculated from its Id.
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// The emoji a [`Reaction`] was made with, either a custom guild emoji (with an Id) or a unicode
/// emoji (with only a name).
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct ReactionEmoji {
    /// The Id of the custom emoji, `None` for unicode emoji.
    #[serde(default)]
    pub id: Option<EmojiId>,
    /// The name of the emoji, or the literal unicode emoji itself.
    #[serde(default)]
    pub name: Option<String>,
}

/// An emoji reaction to a message.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct Reaction {
    /// The Id of the user who made the reaction.
    pub user_id: UserId,
    /// The Id of the channel the message was in.
    pub channel_id: ChannelId,
    /// The Id of the message reacted to.
    pub message_id: MessageId,
    /// The Id of the guild the message was in, if any.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// The emoji used for the reaction.
    pub emoji: ReactionEmoji,
}
