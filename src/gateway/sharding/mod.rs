//! Runtime plumbing for running a fleet of shards.
//!
//! Of interest are three pieces:
//!
//! ### [`ShardManager`]
//!
//! The shard manager is responsible for being a clean interface between the user and the shard
//! runners, providing essential functions such as [`ShardManager::shutdown_all`] to shutdown
//! every shard and [`ShardManager::restart`] to restart a shard. It owns the restart policy and
//! fans inbound dispatches out to subscribers.
//!
//! ### [`ShardQueuer`]
//!
//! The shard queuer is a loop that runs indefinitely to manage the startup of shards: it spawns
//! their runners and serializes every identify - first starts and re-identifies alike - through
//! a single admission slot gated on the remote session start limit.
//!
//! ### [`ShardRunner`]
//!
//! The shard runner is responsible for directly running a single shard and communicating with the
//! gateway through its respective WebSocket client. It performs actions such as identifying,
//! reconnecting, resuming, and sending presence updates to the gateway.
//!
//! Every runner lives in its own task and shares no state with the manager or its peers: all
//! coordination crosses the typed, ordered control channel below ([`ShardRunnerMessage`] inbound
//! to a runner, [`ShardManagerMessage`] outbound from it). Messages are not persisted across a
//! runner restart.

mod shard_manager;
mod shard_messenger;
mod shard_queuer;
mod shard_runner;

use std::num::NonZeroU16;
use std::time::Duration as StdDuration;

use tokio_tungstenite::tungstenite::Message;

pub use self::shard_manager::{ShardManager, ShardManagerOptions};
pub use self::shard_messenger::ShardMessenger;
pub use self::shard_queuer::{IdentifyQueue, PendingIdentify, ShardQueuer};
pub use self::shard_runner::{ShardRunner, ShardRunnerOptions, DEFAULT_SEND_QUEUE_HIGH_WATER};
use super::{ActivityData, ChunkGuildFilter, ConnectionStage, Session};
use crate::internal::prelude::*;
use crate::model::event::Event;
use crate::model::id::{GuildId, ShardId};
use crate::model::user::OnlineStatus;

/// The outcome of an admitted identify attempt, as reported back by the shard.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IdentifyOutcome {
    /// The gateway acknowledged the identify with a Ready.
    Ready,
    /// The gateway invalidated the session; the shard wants back into the queue.
    InvalidSession,
}

/// A message to be sent to the [`ShardQueuer`].
#[derive(Debug)]
pub enum ShardQueuerMessage {
    /// Message to set the shard total.
    SetShardTotal(NonZeroU16),
    /// Message to spawn the runner for a shard.
    Start(ShardId),
    /// Message to append a shard to the tail of the identify admission queue.
    ScheduleIdentify(ShardId),
    /// The admitted shard's reply, releasing the admission slot.
    IdentifyResult(ShardId, IdentifyOutcome),
    /// Message to dequeue/shutdown a shard.
    ShutdownShard { shard_id: ShardId, code: u16 },
    /// Message to shutdown the shard queuer.
    Shutdown,
}

/// A message sent from a [`ShardRunner`] to the [`ShardManager`] over the control channel.
///
/// This is the only path state takes out of a runner; the manager holds no references into a
/// runner's memory.
#[derive(Debug)]
pub enum ShardManagerMessage {
    /// A human-readable breadcrumb describing what the runner is doing.
    Debug(ShardId, String),
    /// An inbound dispatch, to be fanned out to subscribers tagged with the shard id.
    Dispatch(ShardId, Event),
    /// The runner completed its handshake and requests identify admission.
    RequestIdentify(ShardId),
    /// The runner lost its session and asks to be re-admitted at the queue's tail.
    ScheduleIdentify(ShardId),
    /// A fresh heartbeat latency sample.
    UpdatePing(ShardId, StdDuration),
    /// The outcome of an admitted identify attempt.
    GatewayStatus(ShardId, IdentifyOutcome),
    /// The runner's connection stage changed.
    ConnectionStatusUpdate(ShardId, ConnectionStage),
    /// The runner is exiting and cannot bring its connection back on its own. A fatal close code
    /// removes the shard for good; anything else earns a fresh spawn.
    CannotReconnect {
        shard_id: ShardId,
        code: Option<u16>,
        reason: String,
    },
    /// A snapshot of the runner's session, sent after session changes or on request.
    SessionData(ShardId, Option<Session>),
    /// An orderly shutdown of the shard finished.
    ShutdownFinished(ShardId),
}

/// A message sent from the manager side to a [`ShardRunner`].
#[derive(Debug)]
pub enum ShardRunnerMessage {
    /// Identify admission was granted; the runner is to send its IDENTIFY now.
    Identify,
    /// Indicator that the shard should close its connection with code 4000, preserving the
    /// session, and resume.
    Reconnect,
    /// Indicator that a shard should be fully shutdown without bringing it back up, discarding
    /// its session and any queued payloads.
    Shutdown(ShardId, u16),
    /// An application payload to append to the outbound send queue.
    SendPayload(Value),
    /// Ask the runner for a snapshot of its current session.
    FetchSessionData,
    /// Indicates that the client is to send a member chunk message.
    ChunkGuild {
        /// The IDs of the guild to chunk.
        guild_id: GuildId,
        /// The maximum number of members to receive chunks for.
        limit: Option<u16>,
        /// Used to specify if we want the presences of the matched members.
        presences: bool,
        /// A filter to apply to the returned members.
        filter: ChunkGuildFilter,
        /// Optional nonce to identify member chunk responses.
        nonce: Option<String>,
    },
    /// Indicates that the client is to close with the given status code and reason.
    ///
    /// You should rarely - if _ever_ - need this, but the option is available. Prefer to use the
    /// [`ShardManager`] to shutdown WebSocket clients if you are intending to send a 1000 close
    /// code.
    Close(u16, Option<String>),
    /// Indicates that the client is to send a custom WebSocket message.
    Message(Message),
    /// Indicates that the client is to update the shard's presence's activity.
    SetActivity(Option<ActivityData>),
    /// Indicates that the client is to update the shard's presence in its entirety.
    SetPresence(Option<ActivityData>, OnlineStatus),
    /// Indicates that the client is to update the shard's presence's status.
    SetStatus(OnlineStatus),
}

/// Information about a [`ShardRunner`], as mirrored on the manager side of the control channel.
///
/// The [`ShardId`] is not included because, as it stands, you probably already know the Id if you
/// obtained this.
#[derive(Debug)]
pub struct ShardRunnerInfo {
    /// The latency between when a heartbeat was sent and when the acknowledgement was received.
    pub latency: Option<StdDuration>,
    /// The channel used to communicate with the shard runner, telling it what to do with regards
    /// to its status.
    pub runner_tx: ShardMessenger,
    /// The current connection stage of the shard.
    pub stage: ConnectionStage,
    /// The last session snapshot the runner reported.
    pub session: Option<Session>,
}
