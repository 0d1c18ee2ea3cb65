//! A set of constants used by the library.

/// The gateway version used by the library by default. The gateway URL is retrieved via the REST
/// API.
pub const GATEWAY_VERSION: u8 = 10;

/// The default large threshold to send on identify.
pub const LARGE_THRESHOLD: u8 = 250;

/// The [UserAgent] sent along with every request.
///
/// [UserAgent]: reqwest::header::USER_AGENT
pub const USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/tempest-rs/tempest, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

enum_number! {
    /// An enum representing the gateway opcodes.
    ///
    /// [Discord docs](https://discord.com/developers/docs/topics/opcodes-and-status-codes#gateway-gateway-opcodes)
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
    #[serde(from = "u8", into = "u8")]
    #[non_exhaustive]
    pub enum Opcode {
        /// An event was dispatched.
        Dispatch = 0,
        /// Fired periodically by the client to keep the connection alive.
        Heartbeat = 1,
        /// Starts a new session during the initial handshake.
        Identify = 2,
        /// Update the client's presence.
        PresenceUpdate = 3,
        /// Used to join/leave or move between voice channels.
        VoiceStateUpdate = 4,
        /// Resume a previous session that was disconnected.
        Resume = 6,
        /// You should attempt to reconnect and resume immediately.
        Reconnect = 7,
        /// Request information about offline guild members in a large guild.
        RequestGuildMembers = 8,
        /// The session has been invalidated. You should reconnect and identify/resume accordingly.
        InvalidSession = 9,
        /// Sent immediately after connecting, contains the `heartbeat_interval` to use.
        Hello = 10,
        /// Sent in response to receiving a heartbeat to acknowledge that it has been received.
        HeartbeatAck = 11,
        _ => Unknown(u8),
    }
}

pub mod close_codes {
    /// Unknown error. Sent by us with the intent to resume (e.g. on a zombied connection).
    pub const UNKNOWN_ERROR: u16 = 4000;
    /// Invalid Gateway OP Code.
    pub const UNKNOWN_OPCODE: u16 = 4001;
    /// An invalid payload was sent.
    pub const DECODE_ERROR: u16 = 4002;
    /// A payload was sent prior to identifying.
    pub const NOT_AUTHENTICATED: u16 = 4003;
    /// The account token sent with the identify payload was incorrect.
    pub const AUTHENTICATION_FAILED: u16 = 4004;
    /// More than one identify payload was sent.
    pub const ALREADY_AUTHENTICATED: u16 = 4005;
    /// An invalid sequence was sent for resuming.
    pub const INVALID_SEQUENCE: u16 = 4007;
    /// Payloads were sent too quickly.
    pub const RATE_LIMITED: u16 = 4008;
    /// A session timed out.
    pub const SESSION_TIMEOUT: u16 = 4009;
    /// An invalid shard was sent when identifying.
    pub const INVALID_SHARD: u16 = 4010;
    /// Sharding is required to connect.
    pub const SHARDING_REQUIRED: u16 = 4011;
    /// An invalid gateway version was sent.
    pub const INVALID_GATEWAY_VERSION: u16 = 4012;
    /// An invalid intent bit-field was sent.
    pub const INVALID_GATEWAY_INTENTS: u16 = 4013;
    /// A disallowed (unenabled or unapproved) intent was sent.
    pub const DISALLOWED_GATEWAY_INTENTS: u16 = 4014;
    /// Library-internal close code, used when a reconnect was requested so the receiving side of
    /// the connection knows to resume.
    pub const RECONNECT_REQUESTED: u16 = 4900;
}
