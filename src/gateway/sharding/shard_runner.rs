use std::borrow::Cow;
use std::collections::VecDeque;
use std::time::Duration as StdDuration;

use futures::channel::mpsc::{self, UnboundedReceiver as Receiver, UnboundedSender as Sender};
use rand::Rng;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::error::Error as TungsteniteError;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tracing::{debug, error, info, trace, warn};

use super::{IdentifyOutcome, ShardManagerMessage, ShardRunnerMessage};
use crate::constants::close_codes;
use crate::gateway::ratelimiter::PayloadRatelimiter;
use crate::gateway::{GatewayError, ReconnectType, Shard, ShardAction};
use crate::internal::prelude::*;
use crate::model::event::{Event, GatewayEvent};
use crate::model::id::ShardId;

/// Default number of queued outbound payloads past which the connection is considered
/// unserviceable.
///
/// Overflowing this mark is treated like a zombied connection: close with 4000 and resume.
pub const DEFAULT_SEND_QUEUE_HIGH_WATER: usize = 512;

/// A runner for managing a [`Shard`] and its respective WebSocket client.
///
/// A runner owns its shard completely. It shares nothing with the manager: inbound dispatches,
/// status changes and failures leave over the control channel as [`ShardManagerMessage`]s, and
/// instructions arrive as [`ShardRunnerMessage`]s.
pub struct ShardRunner {
    manager_tx: Sender<ShardManagerMessage>,
    // channel for the manager side to send messages to this runner
    runner_rx: Receiver<ShardRunnerMessage>,
    runner_tx: Sender<ShardRunnerMessage>,
    pub(crate) shard: Shard,
    queued_sends: VecDeque<Value>,
    send_queue_high_water: usize,
    ratelimiter: Option<PayloadRatelimiter>,
    ratelimiter_interval: Option<StdDuration>,
    /// Whether the runner has asked the manager for identify admission and is waiting on the
    /// grant.
    awaiting_identify: bool,
    /// Whether an identify has been sent whose Ready/InvalidateSession reply is still owed to
    /// the admission queue.
    identify_in_flight: bool,
}

impl ShardRunner {
    /// Creates a new runner for a Shard.
    pub fn new(opt: ShardRunnerOptions) -> Self {
        let (tx, rx) = mpsc::unbounded();

        Self {
            manager_tx: opt.manager_tx,
            runner_rx: rx,
            runner_tx: tx,
            shard: opt.shard,
            queued_sends: VecDeque::new(),
            send_queue_high_water: opt.send_queue_high_water,
            ratelimiter: None,
            ratelimiter_interval: None,
            awaiting_identify: false,
            identify_in_flight: false,
        }
    }

    /// Starts the runner's loop to receive events.
    ///
    /// This runs a loop that performs the following in each iteration:
    ///
    /// 1. checks the receiver for [`ShardRunnerMessage`]s, and if there is one, acts on it.
    ///
    /// 2. checks if a heartbeat should be sent to the gateway, and if so, sends one; a missed
    ///    acknowledgement here means the connection is zombied, and it is closed with 4000 and
    ///    resumed in place.
    ///
    /// 3. flushes queued outbound payloads in FIFO order, under the gateway's send rate guard.
    ///
    /// 4. attempts to retrieve a message from the WebSocket, processing it into a
    ///    [`GatewayEvent`]. This will block for at most 500ms before assuming there is no message
    ///    available.
    ///
    /// 5. Checks with the [`Shard`] to determine if the gateway event is specifying an action to
    ///    take (e.g. resuming, reconnecting, heartbeating) and then performs that action, if any.
    ///
    /// 6. Forwards the dispatch to the manager for fan-out.
    ///
    /// 7. Go back to 1.
    pub async fn run(&mut self) -> Result<()> {
        let info = self.shard.shard_info();
        info!("[ShardRunner {info}] Running");

        loop {
            trace!("[ShardRunner {info}] loop iteration started.");
            if !self.recv().await {
                return Ok(());
            }

            // check heartbeat
            if !self.shard.do_heartbeat().await {
                warn!("[ShardRunner {info}] Heartbeat not serviced; treating as zombied");
                self.send_debug("zombied connection; closing with 4000 and resuming");

                if !self.close_and_resume().await {
                    return self.request_restart("zombied connection could not resume").await;
                }

                continue;
            }

            self.update_ratelimiter();

            if !self.flush_queued_sends().await {
                self.send_debug("send queue overflowed; closing with 4000 and resuming");
                self.queued_sends.clear();

                if !self.close_and_resume().await {
                    let reason = GatewayError::OverflowedSendQueue.to_string();
                    return self.request_restart(&reason).await;
                }

                continue;
            }

            let pre = self.shard.stage();
            let (event, action, successful) = match self.recv_event().await {
                Ok(triplet) => triplet,
                Err(why) => return self.fail(why).await,
            };
            let post = self.shard.stage();

            if post != pre {
                self.update_manager();
            }

            match action {
                Some(ShardAction::Identify) => self.request_identify(),
                Some(ShardAction::Reidentify) => self.schedule_reidentify().await,
                Some(ShardAction::Heartbeat) => {
                    if let Err(why) = self.shard.heartbeat().await {
                        debug!("[ShardRunner {info}] Reconnecting due to error heartbeating: {why:?}");

                        if !self.try_resume().await {
                            return self.request_restart("requested heartbeat failed").await;
                        }
                    }
                },
                Some(ShardAction::Reconnect(ReconnectType::Resume)) => {
                    if !self.try_resume().await {
                        return self.request_restart("resume failed").await;
                    }
                },
                Some(ShardAction::Reconnect(ReconnectType::Reidentify)) => {
                    return self.request_restart("session cannot be resumed").await;
                },
                None => {},
            }

            if let Some(event) = event {
                self.handle_dispatch_bookkeeping(&event);
                self.send_to_manager(ShardManagerMessage::Dispatch(info.id, event));
            }

            if !successful && !self.shard.stage().is_connecting() {
                return self.request_restart("connection lost").await;
            }
            trace!("[ShardRunner {info}] loop iteration reached the end.");
        }
    }

    /// Clones the internal copy of the Sender to the shard runner.
    pub(super) fn runner_tx(&self) -> Sender<ShardRunnerMessage> {
        self.runner_tx.clone()
    }

    /// Session bookkeeping around dispatches: Ready and Resumed settle the identify admission
    /// and refresh the manager's session snapshot.
    fn handle_dispatch_bookkeeping(&mut self, event: &Event) {
        let shard_id = self.shard.shard_info().id;

        match event {
            Event::Ready(_) => {
                if self.identify_in_flight {
                    self.identify_in_flight = false;
                    self.send_to_manager(ShardManagerMessage::GatewayStatus(
                        shard_id,
                        IdentifyOutcome::Ready,
                    ));
                }

                self.send_to_manager(ShardManagerMessage::SessionData(
                    shard_id,
                    self.shard.session(),
                ));
            },
            Event::Resumed(_) => {
                self.send_to_manager(ShardManagerMessage::SessionData(
                    shard_id,
                    self.shard.session(),
                ));
            },
            _ => {},
        }
    }

    /// Asks the manager for identify admission. The identify itself is only sent once the
    /// manager grants it with [`ShardRunnerMessage::Identify`].
    fn request_identify(&mut self) {
        if self.awaiting_identify {
            return;
        }

        self.awaiting_identify = true;
        self.send_to_manager(ShardManagerMessage::RequestIdentify(self.shard.shard_info().id));
    }

    /// The session was invalidated non-resumably: back off for a jittered 1-5 seconds, then get
    /// back into the admission queue.
    ///
    /// If an identify was in flight, the admission queue is still waiting on its outcome and the
    /// re-enqueue happens through that reply; otherwise the shard asks to be scheduled anew.
    async fn schedule_reidentify(&mut self) {
        let shard_id = self.shard.shard_info().id;
        let backoff = StdDuration::from_millis(rand::rng().random_range(1000..=5000));

        debug!("[ShardRunner {}] Re-identifying in {backoff:?}", self.shard.shard_info());
        tokio::time::sleep(backoff).await;

        self.awaiting_identify = true;

        if self.identify_in_flight {
            self.identify_in_flight = false;
            self.send_to_manager(ShardManagerMessage::GatewayStatus(
                shard_id,
                IdentifyOutcome::InvalidSession,
            ));
        } else {
            self.send_to_manager(ShardManagerMessage::ScheduleIdentify(shard_id));
        }
    }

    /// Closes the connection with code 4000 and resumes in place, preserving the session.
    ///
    /// Returns whether the shard is connected again.
    async fn close_and_resume(&mut self) -> bool {
        let close = CloseFrame {
            code: close_codes::UNKNOWN_ERROR.into(),
            reason: Cow::from(""),
        };
        drop(self.shard.client.close(Some(close)).await);

        self.try_resume().await
    }

    /// Attempts a resume, falling back to `false` when no session survives or the transport
    /// cannot be re-established.
    async fn try_resume(&mut self) -> bool {
        if self.shard.session_id().is_none() {
            return false;
        }

        match self.shard.resume().await {
            Ok(()) => {
                self.update_manager();
                true
            },
            Err(why) => {
                warn!("[ShardRunner {}] Resume failed: {why:?}", self.shard.shard_info());
                false
            },
        }
    }

    fn update_ratelimiter(&mut self) {
        let interval = self.shard.heartbeat_interval();

        if interval != self.ratelimiter_interval {
            self.ratelimiter = interval.map(PayloadRatelimiter::new);
            self.ratelimiter_interval = interval;
        }
    }

    /// Writes queued payloads in FIFO order while the rate guard has budget.
    ///
    /// Returns `false` when the queue has grown past its high-water mark.
    async fn flush_queued_sends(&mut self) -> bool {
        if self.queued_sends.len() > self.send_queue_high_water {
            warn!(
                "[ShardRunner {}] {} payloads queued; connection deemed unserviceable",
                self.shard.shard_info(),
                self.queued_sends.len(),
            );

            return false;
        }

        // Nothing is transmitted before HELLO; the guard only exists once the interval is known.
        while let Some(limiter) = &self.ratelimiter {
            if self.queued_sends.is_empty() || limiter.available() == 0 {
                break;
            }

            limiter.acquire_one().await;

            let Some(payload) = self.queued_sends.pop_front() else {
                break;
            };

            if let Err(why) = self.shard.client.send_raw(&payload).await {
                // The read side will surface the connection problem; the payload is lost.
                warn!("[ShardRunner {}] Err sending payload: {why:?}", self.shard.shard_info());
                break;
            }
        }

        true
    }

    // Checks if the ID received to shutdown is equivalent to the ID of the shard this runner is
    // responsible for. If so, it shuts down the WebSocket client, discarding the session.
    //
    // Returns whether the WebSocket client is still active.
    //
    // If true, the WebSocket client was _not_ shutdown. If false, it was.
    async fn checked_shutdown(&mut self, id: ShardId, close_code: u16) -> bool {
        // First verify the ID so we know for certain this runner is to shutdown.
        if id != self.shard.shard_info().id {
            // Not meant for this runner for some reason, don't shutdown.
            return true;
        }

        // Send a Close Frame to Discord, which allows a bot to "log off"
        drop(
            self.shard
                .client
                .close(Some(CloseFrame {
                    code: close_code.into(),
                    reason: Cow::from(""),
                }))
                .await,
        );

        // In return, we wait for either a Close Frame response, or an error, after which this WS
        // is deemed disconnected from Discord.
        loop {
            match self.shard.client.next().await {
                Some(Ok(tungstenite::Message::Close(_))) | None => break,
                Some(Err(_)) => {
                    warn!(
                        "[ShardRunner {}] Received an error awaiting close frame",
                        self.shard.shard_info(),
                    );
                    break;
                },
                _ => continue,
            }
        }

        self.shard.reset();
        self.queued_sends.clear();

        // Inform the manager that shutdown for this shard has finished.
        self.send_to_manager(ShardManagerMessage::ShutdownFinished(id));
        false
    }

    // Handles a received value over the shard runner rx channel.
    //
    // Returns a boolean on whether the shard runner can continue.
    //
    // This always returns true, except in the case that the manager asked the runner to
    // shutdown.
    async fn handle_rx_value(&mut self, msg: ShardRunnerMessage) -> bool {
        match msg {
            ShardRunnerMessage::Identify => {
                // A grant can also arrive for an identify whose reply never came: the queue
                // reclaims the slot after its timeout and re-admits this shard later.
                if !self.awaiting_identify && !self.identify_in_flight {
                    debug!(
                        "[ShardRunner {}] Admission granted without a request",
                        self.shard.shard_info(),
                    );

                    return true;
                }

                self.awaiting_identify = false;

                match self.shard.identify().await {
                    Ok(()) => {
                        self.identify_in_flight = true;
                        self.update_manager();
                        true
                    },
                    Err(why) => {
                        warn!(
                            "[ShardRunner {}] Err identifying: {why:?}",
                            self.shard.shard_info(),
                        );
                        drop(self.request_restart("failed to send identify").await);
                        false
                    },
                }
            },
            ShardRunnerMessage::Reconnect => {
                self.send_debug("reconnect requested; closing with 4000 and resuming");

                if self.close_and_resume().await {
                    true
                } else {
                    drop(self.request_restart("requested reconnect could not resume").await);
                    false
                }
            },
            ShardRunnerMessage::Shutdown(id, code) => self.checked_shutdown(id, code).await,
            ShardRunnerMessage::SendPayload(payload) => {
                self.queued_sends.push_back(payload);
                true
            },
            ShardRunnerMessage::FetchSessionData => {
                self.send_to_manager(ShardManagerMessage::SessionData(
                    self.shard.shard_info().id,
                    self.shard.session(),
                ));
                true
            },
            ShardRunnerMessage::ChunkGuild {
                guild_id,
                limit,
                presences,
                filter,
                nonce,
            } => {
                let result = self
                    .shard
                    .client
                    .send_chunk_guild(
                        guild_id,
                        &self.shard.shard_info(),
                        limit,
                        presences,
                        filter,
                        nonce.as_deref(),
                    )
                    .await;

                if let Err(why) = result {
                    warn!("[ShardRunner {}] Err chunking guild: {why:?}", self.shard.shard_info());
                }

                true
            },
            ShardRunnerMessage::Close(code, reason) => {
                let reason = reason.unwrap_or_default();
                let close = CloseFrame {
                    code: code.into(),
                    reason: Cow::from(reason),
                };

                if let Err(why) = self.shard.client.close(Some(close)).await {
                    warn!("[ShardRunner {}] Err closing: {why:?}", self.shard.shard_info());
                }

                true
            },
            ShardRunnerMessage::Message(msg) => {
                if let Err(why) = self.shard.client.send(msg).await {
                    warn!("[ShardRunner {}] Err sending message: {why:?}", self.shard.shard_info());
                }

                true
            },
            ShardRunnerMessage::SetActivity(activity) => {
                self.shard.set_activity(activity);
                self.update_presence().await
            },
            ShardRunnerMessage::SetPresence(activity, status) => {
                self.shard.set_presence(activity, status);
                self.update_presence().await
            },
            ShardRunnerMessage::SetStatus(status) => {
                self.shard.set_status(status);
                self.update_presence().await
            },
        }
    }

    async fn update_presence(&mut self) -> bool {
        if let Err(why) = self.shard.update_presence().await {
            warn!("[ShardRunner {}] Err updating presence: {why:?}", self.shard.shard_info());
        }

        true
    }

    // Receives values over the internal shard runner rx channel and handles them.
    //
    // This will loop over values until there is no longer one.
    //
    // Returns whether the shard runner is in a state that can continue.
    async fn recv(&mut self) -> bool {
        loop {
            match self.runner_rx.try_next() {
                Ok(Some(value)) => {
                    if !self.handle_rx_value(value).await {
                        return false;
                    }
                },
                Ok(None) => {
                    // The sending halves are gone; the manager has dropped this shard. There is
                    // nobody left to notify, so just stop.
                    warn!(
                        "[ShardRunner {}] Sending half DC; stopping",
                        self.shard.shard_info(),
                    );

                    return false;
                },
                Err(_) => break,
            }
        }

        // There are no longer any values available.

        true
    }

    /// Returns a received event, as well as whether reading the potentially present event was
    /// successful.
    ///
    /// # Errors
    ///
    /// Returns the fatal [`GatewayError`] when the gateway closed the connection for an
    /// authentication or configuration problem.
    async fn recv_event(&mut self) -> Result<(Option<Event>, Option<ShardAction>, bool)> {
        let gw_event = match self.shard.client.recv_json().await {
            Ok(inner) => Ok(inner),
            Err(Error::Tungstenite(why)) if matches!(*why, TungsteniteError::Io(_)) => {
                debug!("Attempting to auto-reconnect");

                match self.shard.reconnection_type() {
                    ReconnectType::Reidentify => return Ok((None, None, false)),
                    ReconnectType::Resume => {
                        if let Err(why) = self.shard.resume().await {
                            warn!("Failed to resume: {why:?}");

                            // Don't spam reattempts on internet connection loss
                            tokio::time::sleep(StdDuration::from_secs(1)).await;

                            return Ok((None, None, false));
                        }
                    },
                }

                return Ok((None, None, true));
            },
            Err(why) => Err(why),
        };

        let event = match gw_event {
            Ok(Some(event)) => Ok(event),
            Ok(None) => return Ok((None, None, true)),
            Err(why) => Err(why),
        };

        let is_ack = matches!(event, Ok(GatewayEvent::HeartbeatAck));

        let (action, dispatch) = match self.shard.handle_event(event) {
            Ok(pair) => pair,
            Err(why) => {
                error!("Shard handler received err: {why:?}");

                if let Error::Gateway(gateway_error) = &why {
                    if close_code_of(gateway_error).is_some() {
                        return Err(why);
                    }
                }

                return Ok((None, None, true));
            },
        };

        if is_ack {
            self.update_manager();

            if let Some(latency) = self.shard.latency() {
                self.send_to_manager(ShardManagerMessage::UpdatePing(
                    self.shard.shard_info().id,
                    latency,
                ));
            }
        }

        Ok((dispatch, action, true))
    }

    /// Exit path for a fatal gateway error: report it over the control channel so the manager
    /// can surface it, and end the runner without any retry.
    async fn fail(&mut self, why: Error) -> Result<()> {
        let shard_id = self.shard.shard_info().id;

        let code = match &why {
            Error::Gateway(gateway_error) => close_code_of(gateway_error),
            _ => None,
        };

        self.release_admission_slot();
        self.send_to_manager(ShardManagerMessage::CannotReconnect {
            shard_id,
            code,
            reason: why.to_string(),
        });

        Err(why)
    }

    /// Exit path for a recoverable dead end: the runner cannot continue on this connection, so
    /// it reports a synthetic `CannotReconnect` and lets the manager spawn a replacement.
    async fn request_restart(&mut self, reason: &str) -> Result<()> {
        debug!("[ShardRunner {}] Requesting restart: {reason}", self.shard.shard_info());

        self.update_manager();
        self.release_admission_slot();
        self.send_to_manager(ShardManagerMessage::CannotReconnect {
            shard_id: self.shard.shard_info().id,
            code: None,
            reason: reason.to_string(),
        });

        Ok(())
    }

    /// A runner going away while its identify reply is still owed would stall the admission
    /// queue until the timeout; report the identify as failed instead so the slot frees now.
    fn release_admission_slot(&mut self) {
        if self.identify_in_flight {
            self.identify_in_flight = false;
            self.send_to_manager(ShardManagerMessage::GatewayStatus(
                self.shard.shard_info().id,
                IdentifyOutcome::InvalidSession,
            ));
        }
    }

    fn update_manager(&self) {
        self.send_to_manager(ShardManagerMessage::ConnectionStatusUpdate(
            self.shard.shard_info().id,
            self.shard.stage(),
        ));
    }

    fn send_debug(&self, msg: &str) {
        debug!("[ShardRunner {}] {msg}", self.shard.shard_info());
        self.send_to_manager(ShardManagerMessage::Debug(
            self.shard.shard_info().id,
            msg.to_string(),
        ));
    }

    fn send_to_manager(&self, msg: ShardManagerMessage) {
        if let Err(e) = self.manager_tx.unbounded_send(msg) {
            warn!("failed to send ShardManagerMessage to manager: {}", e);
        }
    }
}

/// The close code a fatal [`GatewayError`] travels the wire as, used when reporting
/// `CannotReconnect` so the manager can classify without sharing error values.
fn close_code_of(error: &GatewayError) -> Option<u16> {
    match error {
        GatewayError::NoAuthentication => Some(close_codes::NOT_AUTHENTICATED),
        GatewayError::InvalidAuthentication => Some(close_codes::AUTHENTICATION_FAILED),
        GatewayError::InvalidShardData => Some(close_codes::INVALID_SHARD),
        GatewayError::OverloadedShard => Some(close_codes::SHARDING_REQUIRED),
        GatewayError::InvalidApiVersion => Some(close_codes::INVALID_GATEWAY_VERSION),
        GatewayError::InvalidGatewayIntents => Some(close_codes::INVALID_GATEWAY_INTENTS),
        GatewayError::DisallowedGatewayIntents => Some(close_codes::DISALLOWED_GATEWAY_INTENTS),
        _ => None,
    }
}

/// Options to be passed to [`ShardRunner::new`].
pub struct ShardRunnerOptions {
    pub manager_tx: Sender<ShardManagerMessage>,
    pub shard: Shard,
    pub send_queue_high_water: usize,
}

#[cfg(test)]
mod tests {
    use super::close_code_of;
    use crate::gateway::GatewayError;

    #[test]
    fn fatal_errors_map_to_their_close_codes() {
        assert_eq!(close_code_of(&GatewayError::NoAuthentication), Some(4003));
        assert_eq!(close_code_of(&GatewayError::InvalidAuthentication), Some(4004));
        assert_eq!(close_code_of(&GatewayError::InvalidShardData), Some(4010));
        assert_eq!(close_code_of(&GatewayError::OverloadedShard), Some(4011));
        assert_eq!(close_code_of(&GatewayError::InvalidApiVersion), Some(4012));
        assert_eq!(close_code_of(&GatewayError::InvalidGatewayIntents), Some(4013));
        assert_eq!(close_code_of(&GatewayError::DisallowedGatewayIntents), Some(4014));
        assert_eq!(close_code_of(&GatewayError::HeartbeatFailed), None);
    }
}
