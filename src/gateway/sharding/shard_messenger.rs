use futures::channel::mpsc::UnboundedSender as Sender;
use tokio_tungstenite::tungstenite::Message;

use super::{ShardRunner, ShardRunnerMessage};
use crate::gateway::{ActivityData, ChunkGuildFilter};
use crate::internal::prelude::*;
use crate::model::id::GuildId;
use crate::model::user::OnlineStatus;

/// A handle to a [`ShardRunner`].
///
/// This is used to cleanly communicate with a shard's respective [`ShardRunner`]. This can be
/// used for actions such as setting the activity via [`Self::set_activity`] or shutting down via
/// [`Self::shutdown_clean`].
///
/// [`ShardRunner`]: super::ShardRunner
#[derive(Clone, Debug)]
pub struct ShardMessenger {
    pub(crate) tx: Sender<ShardRunnerMessage>,
}

impl ShardMessenger {
    /// Creates a new shard messenger.
    ///
    /// If you are using the [`Client`], you do not need to do this.
    ///
    /// [`Client`]: crate::client::Client
    #[must_use]
    pub fn new(shard: &ShardRunner) -> Self {
        Self {
            tx: shard.runner_tx(),
        }
    }

    /// Requests that one or multiple guilds be chunked.
    ///
    /// This will ask the gateway to start sending member chunks for large guilds (250 members+).
    /// If a guild is over 250 members, then a full member list will not be downloaded, and must
    /// instead be requested to be sent in "chunks" containing members.
    pub fn chunk_guild(
        &self,
        guild_id: GuildId,
        limit: Option<u16>,
        presences: bool,
        filter: ChunkGuildFilter,
        nonce: Option<String>,
    ) {
        self.send_to_shard(ShardRunnerMessage::ChunkGuild {
            guild_id,
            limit,
            presences,
            filter,
            nonce,
        });
    }

    /// Appends an application payload to the shard's outbound send queue.
    ///
    /// The payload must be a fully shaped `{ op, d }` object; it is written in FIFO order behind
    /// any payloads already queued, under the gateway's send rate guard.
    pub fn send_payload(&self, payload: Value) {
        self.send_to_shard(ShardRunnerMessage::SendPayload(payload));
    }

    /// Asks the runner to report a snapshot of its current session over the control channel.
    pub fn fetch_session_data(&self) {
        self.send_to_shard(ShardRunnerMessage::FetchSessionData);
    }

    /// Sets the user's current activity, if any.
    ///
    /// Other presence settings are maintained.
    pub fn set_activity(&self, activity: Option<ActivityData>) {
        self.send_to_shard(ShardRunnerMessage::SetActivity(activity));
    }

    /// Sets the user's full presence information.
    ///
    /// Consider using the individual setters if you only need to modify one of these.
    pub fn set_presence(&self, activity: Option<ActivityData>, mut status: OnlineStatus) {
        if status == OnlineStatus::Offline {
            status = OnlineStatus::Invisible;
        }

        self.send_to_shard(ShardRunnerMessage::SetPresence(activity, status));
    }

    /// Sets the user's current online status.
    ///
    /// Note that [`Offline`] is not a valid online status, so it is automatically converted to
    /// [`Invisible`].
    ///
    /// Other presence settings are maintained.
    ///
    /// [`Invisible`]: OnlineStatus::Invisible
    /// [`Offline`]: OnlineStatus::Offline
    pub fn set_status(&self, mut online_status: OnlineStatus) {
        if online_status == OnlineStatus::Offline {
            online_status = OnlineStatus::Invisible;
        }

        self.send_to_shard(ShardRunnerMessage::SetStatus(online_status));
    }

    /// Asks the shard to reconnect gracefully: close with code 4000, keep the session, resume.
    pub fn reconnect(&self) {
        self.send_to_shard(ShardRunnerMessage::Reconnect);
    }

    /// Shuts down the websocket by attempting to cleanly close the connection.
    pub fn shutdown_clean(&self) {
        self.send_to_shard(ShardRunnerMessage::Close(1000, None));
    }

    /// Sends a raw message over the WebSocket.
    ///
    /// The given message is not mutated in any way, and is sent as-is.
    ///
    /// You should only use this if you know what you're doing. If you're wanting to, for example,
    /// send a presence update, prefer the usage of the [`Self::set_presence`] method.
    pub fn websocket_message(&self, message: Message) {
        self.send_to_shard(ShardRunnerMessage::Message(message));
    }

    /// Sends a message to the shard.
    pub fn send_to_shard(&self, msg: ShardRunnerMessage) {
        if let Err(e) = self.tx.unbounded_send(msg) {
            tracing::warn!("failed to send ShardRunnerMessage to shard: {}", e);
        }
    }
}
