//! All the events this library handles.
//!
//! Every event includes the gateway data that it receives. The inbound frame `{ op, s, t, d }` is
//! decoded into a [`GatewayEvent`]; the `d` of a dispatch is decoded into an [`Event`] keyed by
//! the `t` event name.

use std::fmt;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};

use super::channel::{Channel, Message, Reaction};
use super::gateway::{Presence, Ready};
use super::guild::{Guild, Member, Role, UnavailableGuild};
use super::id::{ChannelId, GuildId, MessageId, RoleId, UserId};
use super::user::User;
use crate::constants::Opcode;
use crate::internal::prelude::*;

/// Event data for the channel creation event.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct ChannelCreateEvent {
    /// The channel that was created.
    pub channel: Channel,
}

/// Event data for the channel update event.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct ChannelUpdateEvent {
    pub channel: Channel,
}

/// Event data for the channel deletion event.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct ChannelDeleteEvent {
    pub channel: Channel,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct GuildCreateEvent {
    pub guild: Guild,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct GuildUpdateEvent {
    pub guild: Guild,
}

/// The guild became unavailable, or the user was removed from it.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct GuildDeleteEvent {
    pub guild: UnavailableGuild,
}

/// A member joined; the member carries its `guild_id` on this event.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct GuildMemberAddEvent {
    pub member: Member,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct GuildMemberUpdateEvent {
    pub guild_id: GuildId,
    pub user: User,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleId>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct GuildMemberRemoveEvent {
    pub guild_id: GuildId,
    pub user: User,
}

/// One chunk of members, in response to a member chunk request.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct GuildMembersChunkEvent {
    pub guild_id: GuildId,
    #[serde(default)]
    pub members: Vec<Member>,
    pub chunk_index: u32,
    pub chunk_count: u32,
    /// The nonce the chunk request carried, if any.
    #[serde(default)]
    pub nonce: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct GuildRoleCreateEvent {
    pub guild_id: GuildId,
    pub role: Role,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct GuildRoleUpdateEvent {
    pub guild_id: GuildId,
    pub role: Role,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct GuildRoleDeleteEvent {
    pub guild_id: GuildId,
    pub role_id: RoleId,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct InviteCreateEvent {
    pub channel_id: ChannelId,
    pub code: String,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    #[serde(default)]
    pub inviter: Option<User>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct InviteDeleteEvent {
    pub channel_id: ChannelId,
    pub code: String,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct MessageCreateEvent {
    pub message: Message,
}

/// A message edit. Only the fields that were actually sent are present, hence the partial shape
/// compared to [`MessageCreateEvent`].
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct MessageUpdateEvent {
    pub id: MessageId,
    pub channel_id: ChannelId,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct MessageDeleteEvent {
    pub channel_id: ChannelId,
    #[serde(rename = "id")]
    pub message_id: MessageId,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct ReactionAddEvent {
    pub reaction: Reaction,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct ReactionRemoveEvent {
    pub reaction: Reaction,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct ReactionRemoveAllEvent {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct PresenceUpdateEvent {
    pub presence: Presence,
}

/// The data for the READY dispatch.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct ReadyEvent {
    pub ready: Ready,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct ResumedEvent {}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct TypingStartEvent {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// Unix timestamp in seconds of when the user started typing.
    pub timestamp: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct UserUpdateEvent {
    pub current_user: User,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct VoiceStateUpdateEvent {
    pub voice_state: super::guild::VoiceState,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct VoiceServerUpdateEvent {
    /// The voice connection token. This is not the account token.
    pub token: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct WebhookUpdateEvent {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

/// A dispatch with an event name this library does not know. The raw payload is preserved.
#[derive(Clone, Debug, Serialize)]
#[non_exhaustive]
pub struct UnknownEvent {
    pub kind: String,
    pub value: Value,
}

/// Event received over a websocket connection.
#[allow(clippy::large_enum_variant)]
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum Event {
    /// The first event in a connection, containing the initial state.
    ///
    /// Fires once per fresh identify.
    Ready(ReadyEvent),
    /// The presence of a resumed session; no state is carried.
    Resumed(ResumedEvent),
    /// A channel was created.
    ChannelCreate(ChannelCreateEvent),
    /// A channel was updated.
    ChannelUpdate(ChannelUpdateEvent),
    /// A channel was deleted.
    ChannelDelete(ChannelDeleteEvent),
    /// A guild became available, or was joined.
    GuildCreate(GuildCreateEvent),
    /// A guild was updated.
    GuildUpdate(GuildUpdateEvent),
    /// A guild became unavailable, or the user left it.
    GuildDelete(GuildDeleteEvent),
    /// A user joined a guild.
    GuildMemberAdd(GuildMemberAddEvent),
    /// A member was updated.
    GuildMemberUpdate(GuildMemberUpdateEvent),
    /// A user left or was removed from a guild.
    GuildMemberRemove(GuildMemberRemoveEvent),
    /// A chunk of guild members arrived, in response to a chunk request.
    GuildMembersChunk(GuildMembersChunkEvent),
    /// A role was created in a guild.
    GuildRoleCreate(GuildRoleCreateEvent),
    /// A role was updated in a guild.
    GuildRoleUpdate(GuildRoleUpdateEvent),
    /// A role was deleted from a guild.
    GuildRoleDelete(GuildRoleDeleteEvent),
    /// An invite was created.
    InviteCreate(InviteCreateEvent),
    /// An invite was deleted.
    InviteDelete(InviteDeleteEvent),
    /// A message was created.
    MessageCreate(MessageCreateEvent),
    /// A message was edited.
    MessageUpdate(MessageUpdateEvent),
    /// A message was deleted.
    MessageDelete(MessageDeleteEvent),
    /// A reaction was added to a message.
    ReactionAdd(ReactionAddEvent),
    /// A reaction was removed from a message.
    ReactionRemove(ReactionRemoveEvent),
    /// All reactions were removed from a message.
    ReactionRemoveAll(ReactionRemoveAllEvent),
    /// A user's presence was updated.
    PresenceUpdate(PresenceUpdateEvent),
    /// A user started typing.
    TypingStart(TypingStartEvent),
    /// The current user was updated.
    UserUpdate(UserUpdateEvent),
    /// A user's voice state was updated.
    VoiceStateUpdate(VoiceStateUpdateEvent),
    /// The voice server a guild uses changed.
    VoiceServerUpdate(VoiceServerUpdateEvent),
    /// A webhook in a channel was created, updated or deleted.
    WebhookUpdate(WebhookUpdateEvent),
    /// An event name the library does not recognize.
    Unknown(UnknownEvent),
}

impl Event {
    /// The [`EventType`] of the event, usable as a subscription key.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Ready(_) => EventType::Ready,
            Self::Resumed(_) => EventType::Resumed,
            Self::ChannelCreate(_) => EventType::ChannelCreate,
            Self::ChannelUpdate(_) => EventType::ChannelUpdate,
            Self::ChannelDelete(_) => EventType::ChannelDelete,
            Self::GuildCreate(_) => EventType::GuildCreate,
            Self::GuildUpdate(_) => EventType::GuildUpdate,
            Self::GuildDelete(_) => EventType::GuildDelete,
            Self::GuildMemberAdd(_) => EventType::GuildMemberAdd,
            Self::GuildMemberUpdate(_) => EventType::GuildMemberUpdate,
            Self::GuildMemberRemove(_) => EventType::GuildMemberRemove,
            Self::GuildMembersChunk(_) => EventType::GuildMembersChunk,
            Self::GuildRoleCreate(_) => EventType::GuildRoleCreate,
            Self::GuildRoleUpdate(_) => EventType::GuildRoleUpdate,
            Self::GuildRoleDelete(_) => EventType::GuildRoleDelete,
            Self::InviteCreate(_) => EventType::InviteCreate,
            Self::InviteDelete(_) => EventType::InviteDelete,
            Self::MessageCreate(_) => EventType::MessageCreate,
            Self::MessageUpdate(_) => EventType::MessageUpdate,
            Self::MessageDelete(_) => EventType::MessageDelete,
            Self::ReactionAdd(_) => EventType::ReactionAdd,
            Self::ReactionRemove(_) => EventType::ReactionRemove,
            Self::ReactionRemoveAll(_) => EventType::ReactionRemoveAll,
            Self::PresenceUpdate(_) => EventType::PresenceUpdate,
            Self::TypingStart(_) => EventType::TypingStart,
            Self::UserUpdate(_) => EventType::UserUpdate,
            Self::VoiceStateUpdate(_) => EventType::VoiceStateUpdate,
            Self::VoiceServerUpdate(_) => EventType::VoiceServerUpdate,
            Self::WebhookUpdate(_) => EventType::WebhookUpdate,
            Self::Unknown(inner) => EventType::Other(inner.kind.clone()),
        }
    }
}

macro_rules! event_types {
    ($(
        $name:literal => $Variant:ident: $Struct:ident,
    )*) => {
        /// The type of event dispatch received from the gateway, i.e. the `t` field of a dispatch
        /// payload.
        ///
        /// This is a closed enumeration over the event names the gateway documents; anything else
        /// lands in [`Self::Other`].
        #[derive(Clone, Debug, Eq, Hash, PartialEq)]
        #[non_exhaustive]
        pub enum EventType {
            $($Variant,)*
            /// A gateway event name the library does not recognize.
            Other(String),
        }

        impl EventType {
            /// The name of the dispatch as sent by the gateway, e.g. `MESSAGE_CREATE`.
            #[must_use]
            pub fn name(&self) -> &str {
                match self {
                    $(Self::$Variant => $name,)*
                    Self::Other(other) => other,
                }
            }
        }

        impl From<&str> for EventType {
            fn from(name: &str) -> Self {
                match name {
                    $($name => Self::$Variant,)*
                    other => Self::Other(other.to_owned()),
                }
            }
        }

        /// Deserializes a dispatch payload into the event struct its `t` names.
        pub(crate) fn deserialize_event(kind: EventType, value: Value) -> Result<Event> {
            Ok(match kind {
                $(EventType::$Variant => Event::$Variant(serde_json::from_value::<$Struct>(value)?),)*
                EventType::Other(kind) => Event::Unknown(UnknownEvent {
                    kind,
                    value,
                }),
            })
        }
    };
}

event_types! {
    "READY" => Ready: ReadyEvent,
    "RESUMED" => Resumed: ResumedEvent,
    "CHANNEL_CREATE" => ChannelCreate: ChannelCreateEvent,
    "CHANNEL_UPDATE" => ChannelUpdate: ChannelUpdateEvent,
    "CHANNEL_DELETE" => ChannelDelete: ChannelDeleteEvent,
    "GUILD_CREATE" => GuildCreate: GuildCreateEvent,
    "GUILD_UPDATE" => GuildUpdate: GuildUpdateEvent,
    "GUILD_DELETE" => GuildDelete: GuildDeleteEvent,
    "GUILD_MEMBER_ADD" => GuildMemberAdd: GuildMemberAddEvent,
    "GUILD_MEMBER_UPDATE" => GuildMemberUpdate: GuildMemberUpdateEvent,
    "GUILD_MEMBER_REMOVE" => GuildMemberRemove: GuildMemberRemoveEvent,
    "GUILD_MEMBERS_CHUNK" => GuildMembersChunk: GuildMembersChunkEvent,
    "GUILD_ROLE_CREATE" => GuildRoleCreate: GuildRoleCreateEvent,
    "GUILD_ROLE_UPDATE" => GuildRoleUpdate: GuildRoleUpdateEvent,
    "GUILD_ROLE_DELETE" => GuildRoleDelete: GuildRoleDeleteEvent,
    "INVITE_CREATE" => InviteCreate: InviteCreateEvent,
    "INVITE_DELETE" => InviteDelete: InviteDeleteEvent,
    "MESSAGE_CREATE" => MessageCreate: MessageCreateEvent,
    "MESSAGE_UPDATE" => MessageUpdate: MessageUpdateEvent,
    "MESSAGE_DELETE" => MessageDelete: MessageDeleteEvent,
    "MESSAGE_REACTION_ADD" => ReactionAdd: ReactionAddEvent,
    "MESSAGE_REACTION_REMOVE" => ReactionRemove: ReactionRemoveEvent,
    "MESSAGE_REACTION_REMOVE_ALL" => ReactionRemoveAll: ReactionRemoveAllEvent,
    "PRESENCE_UPDATE" => PresenceUpdate: PresenceUpdateEvent,
    "TYPING_START" => TypingStart: TypingStartEvent,
    "USER_UPDATE" => UserUpdate: UserUpdateEvent,
    "VOICE_STATE_UPDATE" => VoiceStateUpdate: VoiceStateUpdateEvent,
    "VOICE_SERVER_UPDATE" => VoiceServerUpdate: VoiceServerUpdateEvent,
    "WEBHOOKS_UPDATE" => WebhookUpdate: WebhookUpdateEvent,
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> StdResult<Self, D::Error> {
        struct EventTypeVisitor;

        impl serde::de::Visitor<'_> for EventTypeVisitor {
            type Value = EventType;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("event type str")
            }

            fn visit_str<E: DeError>(self, v: &str) -> StdResult<Self::Value, E> {
                Ok(EventType::from(v))
            }
        }

        deserializer.deserialize_str(EventTypeVisitor)
    }
}

impl Serialize for EventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> StdResult<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// A frame received over the gateway connection, decoded by opcode.
///
/// Dispatches carry their sequence number and decoded [`Event`].
#[allow(clippy::large_enum_variant)]
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum GatewayEvent {
    Dispatch(u64, Event),
    Heartbeat(u64),
    Reconnect,
    /// Whether the session can be resumed.
    InvalidateSession(bool),
    /// Carries the heartbeat interval in milliseconds.
    Hello(u64),
    HeartbeatAck,
}

impl<'de> Deserialize<'de> for GatewayEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> StdResult<Self, D::Error> {
        let mut map = JsonMap::deserialize(deserializer)?;

        let op = map
            .remove("op")
            .ok_or_else(|| DeError::custom("expected op"))
            .and_then(Opcode::deserialize)
            .map_err(DeError::custom)?;

        Ok(match op {
            Opcode::Dispatch => {
                let s = map
                    .remove("s")
                    .ok_or_else(|| DeError::custom("expected gateway event sequence"))
                    .and_then(u64::deserialize)
                    .map_err(DeError::custom)?;
                let kind = map
                    .remove("t")
                    .ok_or_else(|| DeError::custom("expected gateway event type"))
                    .and_then(EventType::deserialize)
                    .map_err(DeError::custom)?;
                let payload = map
                    .remove("d")
                    .ok_or_else(|| DeError::custom("expected gateway event d"))?;

                let event = deserialize_event(kind, payload).map_err(DeError::custom)?;

                GatewayEvent::Dispatch(s, event)
            },
            Opcode::Heartbeat => {
                let s = map
                    .remove("s")
                    .map(Option::<u64>::deserialize)
                    .transpose()
                    .map_err(DeError::custom)?
                    .flatten()
                    .unwrap_or_default();

                GatewayEvent::Heartbeat(s)
            },
            Opcode::Reconnect => GatewayEvent::Reconnect,
            Opcode::InvalidSession => {
                let resumable = map
                    .remove("d")
                    .ok_or_else(|| DeError::custom("expected gateway invalid session d"))
                    .and_then(bool::deserialize)
                    .map_err(DeError::custom)?;

                GatewayEvent::InvalidateSession(resumable)
            },
            Opcode::Hello => {
                let mut d = map
                    .remove("d")
                    .ok_or_else(|| DeError::custom("expected gateway hello d"))
                    .and_then(JsonMap::deserialize)
                    .map_err(DeError::custom)?;
                let interval = d
                    .remove("heartbeat_interval")
                    .ok_or_else(|| DeError::custom("expected gateway hello interval"))
                    .and_then(u64::deserialize)
                    .map_err(DeError::custom)?;

                GatewayEvent::Hello(interval)
            },
            Opcode::HeartbeatAck => GatewayEvent::HeartbeatAck,
            _ => return Err(DeError::custom("invalid opcode")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_hello() {
        let frame = r#"{"t":null,"s":null,"op":10,"d":{"heartbeat_interval":41250}}"#;

        let Ok(GatewayEvent::Hello(interval)) = serde_json::from_str(frame) else {
            panic!("expected hello");
        };
        assert_eq!(interval, 41250);
    }

    #[test]
    fn decodes_invalid_session_resumable_flag() {
        let ev: GatewayEvent = serde_json::from_str(r#"{"op":9,"d":true}"#).unwrap();
        assert!(matches!(ev, GatewayEvent::InvalidateSession(true)));

        let ev: GatewayEvent = serde_json::from_str(r#"{"op":9,"d":false}"#).unwrap();
        assert!(matches!(ev, GatewayEvent::InvalidateSession(false)));
    }

    #[test]
    fn decodes_message_create_dispatch() {
        let frame = r#"{
            "op": 0,
            "s": 3,
            "t": "MESSAGE_CREATE",
            "d": {
                "id": "1093669200000000000",
                "channel_id": "81384788765712384",
                "author": {"id": "1", "username": "anna", "bot": false},
                "content": "hello there"
            }
        }"#;

        let Ok(GatewayEvent::Dispatch(seq, Event::MessageCreate(ev))) =
            serde_json::from_str(frame)
        else {
            panic!("expected message create dispatch");
        };
        assert_eq!(seq, 3);
        assert_eq!(ev.message.content, "hello there");
        assert_eq!(ev.message.author.name, "anna");
    }

    #[test]
    fn decodes_ready_dispatch() {
        let frame = r#"{
            "op": 0,
            "s": 1,
            "t": "READY",
            "d": {
                "v": 10,
                "user": {"id": "2", "username": "shardbot", "bot": true},
                "session_id": "deadbeef",
                "resume_gateway_url": "wss://us-east1.gateway.discord.gg",
                "shard": [0, 2],
                "guilds": [{"id": "3", "unavailable": true}]
            }
        }"#;

        let Ok(GatewayEvent::Dispatch(1, Event::Ready(ev))) = serde_json::from_str(frame) else {
            panic!("expected ready dispatch");
        };
        assert_eq!(ev.ready.session_id, "deadbeef");
        assert_eq!(ev.ready.shard.unwrap().id.0, 0);
        assert_eq!(ev.ready.guilds.len(), 1);
    }

    #[test]
    fn unknown_dispatch_is_preserved() {
        let frame = r#"{"op":0,"s":9,"t":"SOME_FUTURE_EVENT","d":{"a":1}}"#;

        let Ok(GatewayEvent::Dispatch(9, Event::Unknown(ev))) = serde_json::from_str(frame)
        else {
            panic!("expected unknown dispatch");
        };
        assert_eq!(ev.kind, "SOME_FUTURE_EVENT");
        assert_eq!(ev.value["a"], 1);
        assert_eq!(
            Event::Unknown(ev).event_type(),
            EventType::Other("SOME_FUTURE_EVENT".to_owned())
        );
    }

    #[test]
    fn event_type_round_trips_names() {
        assert_eq!(EventType::from("MESSAGE_CREATE"), EventType::MessageCreate);
        assert_eq!(EventType::MessageCreate.name(), "MESSAGE_CREATE");
        assert_eq!(EventType::from("NOT_A_REAL_EVENT").name(), "NOT_A_REAL_EVENT");
    }
}
