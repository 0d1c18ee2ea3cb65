use std::fmt;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use super::ws::WsClient;
use super::{GatewayError, IdentifyProperties, PresenceData, Session};
use crate::constants::close_codes;
use crate::internal::prelude::*;
use crate::model::event::{Event, GatewayEvent};
use crate::model::gateway::{GatewayIntents, ShardInfo};
use crate::model::user::OnlineStatus;

/// A Shard is an abstract handler for a websocket connection to Discord's gateway. The shard
/// allows for sending and receiving messages over the websocket, such as setting the active
/// activity, reconnecting, resuming, and more.
///
/// The shard tracks the opcode-level protocol: handshake stage, sequence number, session,
/// heartbeat bookkeeping, and the identify/resume decision. It does not schedule itself; a
/// [`ShardRunner`] drives it and a [`ShardManager`] admits its identifies.
///
/// # Stand-alone shards
///
/// You may instantiate a shard yourself - decoupled from the manager - by calling
/// [`Shard::new`]. Most use cases will not necessitate this, and unless you're doing something
/// really weird you can just let the client do it for you.
///
/// [`ShardManager`]: super::ShardManager
/// [`ShardRunner`]: super::ShardRunner
pub struct Shard {
    pub client: WsClient,
    presence: PresenceData,
    last_heartbeat_sent: Option<Instant>,
    last_heartbeat_ack: Option<Instant>,
    heartbeat_interval: Option<StdDuration>,
    /// When the very first heartbeat of a connection is due; randomized to de-synchronize the
    /// heartbeats of a fleet of shards.
    first_heartbeat_due: Option<Instant>,
    /// This is used by the heartbeater to determine whether the last heartbeat was sent without
    /// an acknowledgement, and whether to reconnect.
    // This must be set to `true` in `Shard::handle_event`'s `GatewayEvent::HeartbeatAck` arm.
    last_heartbeat_acknowledged: bool,
    seq: u64,
    session_id: Option<String>,
    shard_info: ShardInfo,
    stage: ConnectionStage,
    /// Instant of when the shard was started.
    // This acts as a timeout to determine if the shard has - for some reason - not started within
    // a decent amount of time.
    pub started: Instant,
    token: SecretString,
    ws_url: Arc<str>,
    resume_ws_url: Option<String>,
    gateway_version: u8,
    large_threshold: u8,
    properties: IdentifyProperties,
    pub intents: GatewayIntents,
}

/// Everything a [`Shard`] needs to open its connection and identify.
///
/// The token is passed by value; a shard never shares it with anything else.
pub struct ShardOptions {
    pub ws_url: Arc<str>,
    pub token: SecretString,
    pub shard_info: ShardInfo,
    pub intents: GatewayIntents,
    pub gateway_version: u8,
    pub large_threshold: u8,
    pub presence: Option<PresenceData>,
    pub properties: IdentifyProperties,
}

impl Shard {
    /// Instantiates a new instance of a Shard, bypassing the client.
    ///
    /// **Note**: You should likely never need to do this yourself.
    ///
    /// # Errors
    ///
    /// On error, will return either [`Error::Gateway`], [`Error::Tungstenite`] or a Rustls/native
    /// TLS error.
    pub async fn new(opt: ShardOptions) -> Result<Shard> {
        let client = connect(&opt.ws_url, opt.gateway_version).await?;

        Ok(Shard {
            client,
            presence: opt.presence.unwrap_or_default(),
            last_heartbeat_sent: None,
            last_heartbeat_ack: None,
            heartbeat_interval: None,
            first_heartbeat_due: None,
            last_heartbeat_acknowledged: true,
            seq: 0,
            session_id: None,
            shard_info: opt.shard_info,
            stage: ConnectionStage::Handshake,
            started: Instant::now(),
            token: opt.token,
            ws_url: opt.ws_url,
            resume_ws_url: None,
            gateway_version: opt.gateway_version,
            large_threshold: opt.large_threshold,
            properties: opt.properties,
            intents: opt.intents,
        })
    }

    /// Retrieves the current presence of the shard.
    pub fn presence(&self) -> &PresenceData {
        &self.presence
    }

    /// Retrieves the value of when the last heartbeat was sent.
    pub fn last_heartbeat_sent(&self) -> Option<Instant> {
        self.last_heartbeat_sent
    }

    /// Retrieves the value of when the last heartbeat ack was received.
    pub fn last_heartbeat_ack(&self) -> Option<Instant> {
        self.last_heartbeat_ack
    }

    /// Sends a heartbeat to the gateway with the current sequence.
    ///
    /// This sets the last heartbeat time to now, and [`Self::last_heartbeat_acknowledged`] to
    /// `false`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::HeartbeatFailed`] if there was an error sending a heartbeat.
    pub async fn heartbeat(&mut self) -> Result<()> {
        match self.client.send_heartbeat(&self.shard_info, Some(self.seq)).await {
            Ok(()) => {
                self.last_heartbeat_sent = Some(Instant::now());
                self.last_heartbeat_acknowledged = false;

                Ok(())
            },
            Err(why) => {
                warn!("[{}] Err heartbeating: {why:?}", self.shard_info);

                Err(Error::Gateway(GatewayError::HeartbeatFailed))
            },
        }
    }

    /// Returns the heartbeat interval dictated by Discord, if the Hello packet has been received.
    pub fn heartbeat_interval(&self) -> Option<StdDuration> {
        self.heartbeat_interval
    }

    pub fn last_heartbeat_acknowledged(&self) -> bool {
        self.last_heartbeat_acknowledged
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// A snapshot of the current session, if one is established.
    pub fn session(&self) -> Option<Session> {
        self.session_id.as_ref().map(|session_id| Session {
            session_id: session_id.clone(),
            seq: self.seq,
        })
    }

    pub fn set_activity(&mut self, activity: Option<super::ActivityData>) {
        self.presence.activity = activity;
    }

    pub fn set_presence(&mut self, activity: Option<super::ActivityData>, status: OnlineStatus) {
        self.set_activity(activity);
        self.set_status(status);
    }

    pub fn set_status(&mut self, mut status: OnlineStatus) {
        if status == OnlineStatus::Offline {
            status = OnlineStatus::Invisible;
        }

        self.presence.status = status;
    }

    /// Retrieves a copy of the current shard information.
    pub fn shard_info(&self) -> ShardInfo {
        self.shard_info
    }

    /// Returns the current connection stage of the shard.
    pub fn stage(&self) -> ConnectionStage {
        self.stage
    }

    fn handle_gateway_dispatch(&mut self, seq: u64, event: Event) -> Option<Event> {
        if seq > self.seq + 1 {
            warn!("[{}] Sequence off; them: {seq}, us: {}", self.shard_info, self.seq);
        }

        // The protocol orders dispatches on the server side; a regression here would only come
        // from a misbehaving gateway, so never move the cursor backwards.
        self.seq = self.seq.max(seq);

        match &event {
            Event::Ready(ready) => {
                debug!("[{}] Received Ready", self.shard_info);

                self.resume_ws_url = Some(ready.ready.resume_gateway_url.clone());
                self.session_id = Some(ready.ready.session_id.clone());
                self.stage = ConnectionStage::Connected;
            },
            Event::Resumed(_) => {
                info!("[{}] Resumed", self.shard_info);

                self.stage = ConnectionStage::Connected;
                self.last_heartbeat_acknowledged = true;
                self.last_heartbeat_sent = Some(Instant::now());
                self.last_heartbeat_ack = None;
            },
            _ => {},
        }

        Some(event)
    }

    fn handle_heartbeat_event(&mut self, s: u64) -> ShardAction {
        info!("[{}] Received shard heartbeat", self.shard_info);

        // Received seq is off -- attempt to resume.
        if s > self.seq + 1 {
            info!("[{}] Received off sequence (them: {s}; us: {})", self.shard_info, self.seq);

            if self.stage == ConnectionStage::Handshake {
                self.stage = ConnectionStage::Identifying;

                return ShardAction::Identify;
            }

            warn!("[{}] Heartbeat during non-Handshake; auto-reconnecting", self.shard_info);

            return ShardAction::Reconnect(self.reconnection_type());
        }

        ShardAction::Heartbeat
    }

    fn handle_gateway_closed(
        &mut self,
        data: Option<&CloseFrame<'static>>,
    ) -> Result<Option<ShardAction>> {
        let num = data.map(|d| d.code.into());
        let clean = num == Some(1000);

        match num {
            Some(close_codes::UNKNOWN_OPCODE) => {
                warn!("[{}] Sent invalid opcode.", self.shard_info);
            },
            Some(close_codes::DECODE_ERROR) => {
                warn!("[{}] Sent invalid message.", self.shard_info);
            },
            Some(close_codes::NOT_AUTHENTICATED) => {
                warn!("[{}] Sent no authentication.", self.shard_info);
            },
            Some(close_codes::AUTHENTICATION_FAILED) => {
                error!("[{}] Sent invalid authentication, please check the token.", self.shard_info);
            },
            Some(close_codes::ALREADY_AUTHENTICATED) => {
                warn!("[{}] Already authenticated.", self.shard_info);
            },
            Some(close_codes::INVALID_SEQUENCE) => {
                warn!("[{}] Sent invalid seq: {}.", self.shard_info, self.seq);

                self.seq = 0;
            },
            Some(close_codes::RATE_LIMITED) => {
                warn!("[{}] Gateway ratelimited.", self.shard_info);
            },
            Some(close_codes::INVALID_SHARD) => {
                warn!("[{}] Sent invalid shard data.", self.shard_info);
            },
            Some(close_codes::SHARDING_REQUIRED) => {
                error!("[{}] Shard has too many guilds.", self.shard_info);
            },
            Some(close_codes::INVALID_GATEWAY_VERSION) => {
                error!("[{}] Requested an invalid gateway version.", self.shard_info);
            },
            Some(close_codes::INVALID_GATEWAY_INTENTS) => {
                error!("[{}] Invalid gateway intents have been provided.", self.shard_info);
            },
            Some(close_codes::DISALLOWED_GATEWAY_INTENTS) => {
                error!("[{}] Disallowed gateway intents have been provided.", self.shard_info);
            },
            Some(4006) => {
                info!("[{}] Invalid session.", self.shard_info);

                self.session_id = None;
            },
            Some(close_codes::SESSION_TIMEOUT) => {
                // The session is kept; if it really is gone the resume gets answered with an
                // INVALID_SESSION and the re-identify happens through that path.
                info!("[{}] Session timed out.", self.shard_info);
            },
            Some(close_codes::RECONNECT_REQUESTED) => {
                debug!("[{}] Remote asked for a reconnect.", self.shard_info);
            },
            Some(other) if !clean => {
                warn!(
                    "[{}] Unknown unclean close {other}: {:?}",
                    self.shard_info,
                    data.map(|d| &d.reason),
                );
            },
            _ => {},
        }

        match close_policy(num, self.session_id.is_some()) {
            Ok(reconnect) => Ok(Some(ShardAction::Reconnect(reconnect))),
            Err(fatal) => Err(Error::Gateway(fatal)),
        }
    }

    /// Handles an event from the gateway over the receiver.
    ///
    /// The best case scenario is that one of two values is returned:
    /// - `Ok((None, None))`: a heartbeat ack or late hello was received;
    /// - `Ok((None, Some(event)))`: an op0 dispatch was received that requires no action.
    ///
    /// # Errors
    ///
    /// Returns the fatal [`GatewayError`] matching the close code when the gateway closed the
    /// connection for an authentication or configuration problem; these must not be retried.
    pub fn handle_event(
        &mut self,
        event: Result<GatewayEvent>,
    ) -> Result<(Option<ShardAction>, Option<Event>)> {
        let action = match event {
            Ok(GatewayEvent::Dispatch(seq, event)) => {
                return Ok((None, self.handle_gateway_dispatch(seq, event)));
            },
            Ok(GatewayEvent::Heartbeat(s)) => Ok(Some(self.handle_heartbeat_event(s))),
            Ok(GatewayEvent::HeartbeatAck) => {
                self.last_heartbeat_ack = Some(Instant::now());
                self.last_heartbeat_acknowledged = true;

                trace!("[{}] Received heartbeat ack", self.shard_info);

                Ok(None)
            },
            Ok(GatewayEvent::Hello(interval)) => {
                debug!("[{}] Received a Hello; interval: {interval}", self.shard_info);

                if self.stage == ConnectionStage::Resuming {
                    return Ok((None, None));
                }

                let interval = StdDuration::from_millis(interval);
                self.heartbeat_interval = Some(interval);
                // The very first heartbeat is delayed by a random fraction of the interval so a
                // fleet of shards does not heartbeat in lockstep.
                self.last_heartbeat_sent = None;
                self.first_heartbeat_due =
                    Some(Instant::now() + interval.mul_f64(rand::rng().random::<f64>()));

                Ok(Some(if self.stage == ConnectionStage::Handshake {
                    ShardAction::Identify
                } else {
                    debug!("[{}] Received late Hello; autoreconnecting", self.shard_info);

                    ShardAction::Reconnect(self.reconnection_type())
                }))
            },
            Ok(GatewayEvent::InvalidateSession(resumable)) => {
                info!("[{}] Received session invalidation", self.shard_info);

                Ok(Some(if resumable {
                    ShardAction::Reconnect(ReconnectType::Resume)
                } else {
                    self.session_id = None;
                    self.seq = 0;
                    self.stage = ConnectionStage::Handshake;

                    ShardAction::Reidentify
                }))
            },
            Ok(GatewayEvent::Reconnect) => Ok(Some(ShardAction::Reconnect(ReconnectType::Resume))),
            Err(Error::Gateway(GatewayError::Closed(data))) => {
                self.handle_gateway_closed(data.as_ref())
            },
            Err(Error::Tungstenite(why)) => {
                warn!("[{}] Websocket error: {why:?}", self.shard_info);
                info!("[{}] Will attempt to auto-reconnect", self.shard_info);

                Ok(Some(ShardAction::Reconnect(self.reconnection_type())))
            },
            Err(why) => {
                warn!("[{}] Unhandled error: {why:?}", self.shard_info);

                Ok(None)
            },
        };

        action.map(|a| (a, None))
    }

    /// Does a heartbeat if needed. Returns false if something went wrong and the shard should be
    /// restarted.
    ///
    /// `true` is returned under one of the following conditions:
    /// - the heartbeat interval has not elapsed
    /// - a heartbeat was successfully sent
    /// - there is no known heartbeat interval yet
    ///
    /// `false` is returned under one of the following conditions:
    /// - a heartbeat acknowledgement was not received in time
    /// - an error occurred while heartbeating
    pub async fn do_heartbeat(&mut self) -> bool {
        let Some(heartbeat_interval) = self.heartbeat_interval else {
            // No Hello received yet
            return self.started.elapsed() < StdDuration::from_secs(15);
        };

        // If a duration of time less than the heartbeat_interval has passed, then don't perform a
        // keepalive or attempt to reconnect.
        match self.last_heartbeat_sent {
            Some(last_sent) => {
                if last_sent.elapsed() <= heartbeat_interval {
                    return true;
                }
            },
            None => {
                if self.first_heartbeat_due.is_some_and(|due| Instant::now() < due) {
                    return true;
                }
            },
        }

        // If the last heartbeat didn't receive an acknowledgement, then auto-reconnect.
        if !self.last_heartbeat_acknowledged {
            debug!("[{}] Last heartbeat not acknowledged", self.shard_info);

            return false;
        }

        // Otherwise, we're good to heartbeat.
        if let Err(why) = self.heartbeat().await {
            warn!("[{}] Err heartbeating: {why:?}", self.shard_info);

            false
        } else {
            trace!("[{}] Heartbeat", self.shard_info);

            true
        }
    }

    /// Calculates the heartbeat latency between the shard and the gateway.
    pub fn latency(&self) -> Option<StdDuration> {
        if let (Some(sent), Some(received)) = (self.last_heartbeat_sent, self.last_heartbeat_ack) {
            if received > sent {
                return Some(received - sent);
            }
        }

        None
    }

    /// The type of reconnect this shard should perform: a RESUME while its session still exists,
    /// a fresh IDENTIFY otherwise.
    pub fn reconnection_type(&self) -> ReconnectType {
        if self.session_id.is_some() {
            ReconnectType::Resume
        } else {
            ReconnectType::Reidentify
        }
    }

    /// Sends the identify payload and moves into [`ConnectionStage::Identifying`].
    ///
    /// Callers must have been admitted by the manager's identify queue first; the runner requests
    /// admission over the control channel and calls this when granted.
    ///
    /// # Errors
    ///
    /// Errors if there is a problem with the WS connection.
    pub async fn identify(&mut self) -> Result<()> {
        self.client
            .send_identify(
                &self.shard_info,
                self.token.expose_secret(),
                self.intents,
                self.large_threshold,
                &self.presence,
                &self.properties,
            )
            .await?;

        self.stage = ConnectionStage::Identifying;

        Ok(())
    }

    /// Reinitializes an existing WebSocket client, replacing it.
    ///
    /// This will set the stage of the shard before and after instantiation of the client.
    ///
    /// # Errors
    ///
    /// Errors if unable to establish a websocket connection.
    pub async fn reinitialize(&mut self) -> Result<WsClient> {
        debug!("[{}] Initializing.", self.shard_info);

        // Reconnect to the resume URL if possible, otherwise use the generic URL.
        let ws_url = self.resume_ws_url.as_deref().unwrap_or(&self.ws_url);

        self.stage = ConnectionStage::Connecting;
        self.started = Instant::now();
        let client = connect(ws_url, self.gateway_version).await?;
        self.stage = ConnectionStage::Handshake;

        // The new transport starts with clean heartbeat bookkeeping: the un-acked state of the
        // old connection must not trip the zombie check before the handshake completes, and
        // counting the interval from now means nothing is transmitted before HELLO arrives.
        self.last_heartbeat_acknowledged = true;
        self.last_heartbeat_sent = Some(Instant::now());
        self.last_heartbeat_ack = None;
        self.first_heartbeat_due = None;

        Ok(client)
    }

    pub fn reset(&mut self) {
        self.last_heartbeat_sent = None;
        self.last_heartbeat_ack = None;
        self.heartbeat_interval = None;
        self.first_heartbeat_due = None;
        self.last_heartbeat_acknowledged = true;
        self.session_id = None;
        self.stage = ConnectionStage::Disconnected;
        self.seq = 0;
    }

    /// Reopens the connection and sends a RESUME for the current session.
    ///
    /// # Errors
    ///
    /// Errors if unable to re-establish a websocket connection, or if no session exists.
    pub async fn resume(&mut self) -> Result<()> {
        debug!("[{}] Attempting to resume", self.shard_info);

        self.client = self.reinitialize().await?;
        self.stage = ConnectionStage::Resuming;

        match &self.session_id {
            Some(session_id) => {
                self.client
                    .send_resume(&self.shard_info, session_id, self.seq, self.token.expose_secret())
                    .await
            },
            None => Err(Error::Gateway(GatewayError::NoSessionId)),
        }
    }

    /// Discards all connection state and reopens the connection, for a fresh identify.
    ///
    /// # Errors
    ///
    /// Errors if unable to re-establish a websocket connection.
    pub async fn reconnect(&mut self) -> Result<()> {
        info!("[{}] Attempting to reconnect", self.shard_info());

        self.reset();
        self.client = self.reinitialize().await?;

        Ok(())
    }

    /// # Errors
    ///
    /// Errors if there is a problem with the WS connection.
    pub async fn update_presence(&mut self) -> Result<()> {
        self.client.send_presence_update(&self.shard_info, &self.presence).await
    }
}

/// Decides what a transport close means: resumable closes reconnect (resuming when a session
/// survives), fatal authentication/configuration closes surface and must not be retried.
fn close_policy(code: Option<u16>, has_session: bool) -> StdResult<ReconnectType, GatewayError> {
    if let Some(fatal) = code.and_then(fatal_close_error) {
        return Err(fatal);
    }

    if has_session {
        Ok(ReconnectType::Resume)
    } else {
        Ok(ReconnectType::Reidentify)
    }
}

/// The fatal [`GatewayError`] a close code maps to, if it is one of the non-retryable ones.
pub(crate) fn fatal_close_error(code: u16) -> Option<GatewayError> {
    match code {
        close_codes::NOT_AUTHENTICATED => Some(GatewayError::NoAuthentication),
        close_codes::AUTHENTICATION_FAILED => Some(GatewayError::InvalidAuthentication),
        close_codes::INVALID_SHARD => Some(GatewayError::InvalidShardData),
        close_codes::SHARDING_REQUIRED => Some(GatewayError::OverloadedShard),
        close_codes::INVALID_GATEWAY_VERSION => Some(GatewayError::InvalidApiVersion),
        close_codes::INVALID_GATEWAY_INTENTS => Some(GatewayError::InvalidGatewayIntents),
        close_codes::DISALLOWED_GATEWAY_INTENTS => Some(GatewayError::DisallowedGatewayIntents),
        _ => None,
    }
}

async fn connect(base_url: &str, version: u8) -> Result<WsClient> {
    let url =
        Url::parse(&format!("{base_url}?v={version}&encoding=json")).map_err(|why| {
            warn!("Error building gateway URL with base `{base_url}`: {why:?}");
            Error::Gateway(GatewayError::BuildingUrl)
        })?;

    WsClient::connect(url).await
}

/// The action a [`Shard`] has decided its runner should take in response to a gateway event.
#[derive(Debug)]
#[non_exhaustive]
pub enum ShardAction {
    /// Send a heartbeat immediately, outside the regular schedule.
    Heartbeat,
    /// Request identify admission from the manager; identify when granted.
    Identify,
    /// The session was invalidated non-resumably: back off briefly, then request re-admission.
    Reidentify,
    /// Reconnect the transport, resuming or re-identifying per the payload.
    Reconnect(ReconnectType),
}

/// Indicates the current connection stage of a [`Shard`].
///
/// This can be useful for knowing which shards are currently "down"/"up".
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[non_exhaustive]
pub enum ConnectionStage {
    /// Indicator that the [`Shard`] is normally connected and is not in, e.g., a resume phase.
    Connected,
    /// Indicator that the [`Shard`] is connecting and is in, e.g., a resume phase.
    Connecting,
    /// Indicator that the [`Shard`] is fully disconnected and is not in a reconnecting phase.
    Disconnected,
    /// Indicator that the [`Shard`] is currently initiating a handshake.
    Handshake,
    /// Indicator that the [`Shard`] has sent an IDENTIFY packet and is awaiting a READY packet.
    Identifying,
    /// Indicator that the [`Shard`] has sent a RESUME packet and is awaiting a RESUMED packet.
    Resuming,
}

impl ConnectionStage {
    /// Whether the stage is a form of connecting.
    ///
    /// This will return `true` on:
    /// - [`Connecting`][`ConnectionStage::Connecting`]
    /// - [`Handshake`][`ConnectionStage::Handshake`]
    /// - [`Identifying`][`ConnectionStage::Identifying`]
    /// - [`Resuming`][`ConnectionStage::Resuming`]
    ///
    /// All other variants will return `false`.
    #[must_use]
    pub fn is_connecting(self) -> bool {
        use self::ConnectionStage::{Connecting, Handshake, Identifying, Resuming};
        matches!(self, Connecting | Handshake | Identifying | Resuming)
    }
}

impl fmt::Display for ConnectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Self::Connected => "connected",
            Self::Connecting => "connecting",
            Self::Disconnected => "disconnected",
            Self::Handshake => "handshaking",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
        })
    }
}

/// The type of reconnection that should be performed.
#[derive(Debug)]
#[non_exhaustive]
pub enum ReconnectType {
    /// Indicator that a new connection should be made by sending an IDENTIFY.
    Reidentify,
    /// Indicator that a new connection should be made by sending a RESUME.
    Resume,
}

#[cfg(test)]
mod tests {
    use super::{close_policy, fatal_close_error, ReconnectType};
    use crate::constants::close_codes;
    use crate::gateway::GatewayError;

    #[test]
    fn resumable_close_codes_resume_while_a_session_exists() {
        for code in [4000, 4001, 4002, 4005, 4007, 4008, 4009, close_codes::RECONNECT_REQUESTED] {
            assert!(
                matches!(close_policy(Some(code), true), Ok(ReconnectType::Resume)),
                "close code {code} should resume",
            );
        }

        // Unknown and transport-level closes are resumable too.
        assert!(matches!(close_policy(Some(1006), true), Ok(ReconnectType::Resume)));
        assert!(matches!(close_policy(None, true), Ok(ReconnectType::Resume)));
    }

    #[test]
    fn closes_without_a_session_reidentify() {
        assert!(matches!(close_policy(Some(4000), false), Ok(ReconnectType::Reidentify)));
        assert!(matches!(close_policy(None, false), Ok(ReconnectType::Reidentify)));
    }

    #[test]
    fn fatal_close_codes_surface_and_never_retry() {
        assert!(matches!(
            close_policy(Some(4003), true),
            Err(GatewayError::NoAuthentication)
        ));
        assert!(matches!(
            close_policy(Some(4004), true),
            Err(GatewayError::InvalidAuthentication)
        ));

        for code in 4010..=4014 {
            assert!(fatal_close_error(code).is_some(), "close code {code} should be fatal");
        }

        assert!(matches!(
            close_policy(Some(4014), false),
            Err(GatewayError::DisallowedGatewayIntents)
        ));
    }
}
