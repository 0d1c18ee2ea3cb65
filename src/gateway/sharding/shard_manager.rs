use std::collections::HashMap;
use std::num::NonZeroU16;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::channel::mpsc::{self, UnboundedReceiver as Receiver, UnboundedSender as Sender};
use futures::{SinkExt, StreamExt};
use secrecy::SecretString;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::{
    IdentifyOutcome,
    IdentifyQueue,
    ShardManagerMessage,
    ShardQueuer,
    ShardQueuerMessage,
    ShardRunnerInfo,
};
use crate::client::dispatch::Subscriptions;
use crate::gateway::{fatal_close_error, GatewayError, IdentifyProperties, PresenceData, Session};
use crate::http::Http;
use crate::internal::tokio::spawn_named;
use crate::model::gateway::GatewayIntents;
use crate::model::id::ShardId;

/// A manager for handling the status of shards by starting them, restarting them, and stopping
/// them when required.
///
/// **Note**: The [`Client`] internally uses a shard manager. If you are using a Client, then you
/// do not need to make one of these.
///
/// The manager owns the fleet: only it mutates the shard set. It talks to each runner purely over
/// the control channel, admits every identify through the [`ShardQueuer`], and fans inbound
/// dispatches out to the registered [`Subscriptions`]. A single shard's fatal failure never halts
/// the rest of the fleet.
///
/// [`Client`]: crate::client::Client
#[derive(Debug)]
pub struct ShardManager {
    return_value_tx: Mutex<Sender<Result<(), GatewayError>>>,
    /// The shard runners currently managed.
    ///
    /// **Note**: It is highly unrecommended to mutate this yourself unless you need to. Instead
    /// prefer to use methods on this struct that are provided where possible.
    pub runners: Arc<Mutex<HashMap<ShardId, ShardRunnerInfo>>>,
    shard_queuer: Sender<ShardQueuerMessage>,
    // We can safely use a Mutex for this field, as it is only ever used in one single place
    // and only is ever used to receive a single message
    shard_shutdown: Mutex<Receiver<ShardId>>,
    shard_shutdown_send: Sender<ShardId>,
    subscriptions: Arc<Subscriptions>,
    gateway_intents: GatewayIntents,
}

impl ShardManager {
    /// Creates a new shard manager, returning both the manager and a monitor for usage in a
    /// separate task.
    #[must_use]
    pub fn new(opt: ShardManagerOptions) -> (Arc<Self>, Receiver<Result<(), GatewayError>>) {
        let (return_value_tx, return_value_rx) = mpsc::unbounded();
        let (shard_queue_tx, shard_queue_rx) = mpsc::unbounded();
        let (manager_tx, manager_rx) = mpsc::unbounded();
        let (shutdown_send, shutdown_recv) = mpsc::unbounded();

        let runners = Arc::new(Mutex::new(HashMap::new()));

        let manager = Arc::new(Self {
            return_value_tx: Mutex::new(return_value_tx),
            shard_queuer: shard_queue_tx,
            shard_shutdown: Mutex::new(shutdown_recv),
            shard_shutdown_send: shutdown_send,
            runners: Arc::clone(&runners),
            subscriptions: opt.subscriptions,
            gateway_intents: opt.intents,
        });

        let mut shard_queuer = ShardQueuer {
            http: opt.http,
            manager_tx,
            last_admission: None,
            queue: IdentifyQueue::new(),
            pending: None,
            pending_spawns: std::collections::VecDeque::new(),
            runners,
            rx: shard_queue_rx,
            ws_url: opt.ws_url,
            shard_total: opt.shard_total,
            intents: opt.intents,
            presence: opt.presence,
            token: opt.token,
            gateway_version: opt.gateway_version,
            large_threshold: opt.large_threshold,
            properties: opt.properties,
            send_queue_high_water: opt.send_queue_high_water,
        };

        spawn_named("shard_queuer::run", async move {
            shard_queuer.run().await;
        });

        let monitor = Arc::downgrade(&manager);
        spawn_named("shard_manager::monitor", async move {
            Self::monitor(monitor, manager_rx).await;
        });

        (manager, return_value_rx)
    }

    /// Drains runner messages for as long as any runner (or the queuer) holds a sending half.
    ///
    /// Holding only a [`Weak`] keeps a dropped manager from being pinned alive by its own
    /// monitor.
    async fn monitor(this: Weak<Self>, mut rx: Receiver<ShardManagerMessage>) {
        while let Some(msg) = rx.next().await {
            let Some(manager) = this.upgrade() else {
                break;
            };

            manager.handle_runner_message(msg).await;
        }

        debug!("[ShardManager] Monitor stopping");
    }

    async fn handle_runner_message(&self, msg: ShardManagerMessage) {
        match msg {
            ShardManagerMessage::Debug(shard_id, msg) => {
                debug!("[Shard {shard_id}] {msg}");
                self.subscriptions.debug(&msg);
            },
            ShardManagerMessage::Dispatch(shard_id, event) => {
                self.subscriptions.dispatch(shard_id, &event);
            },
            ShardManagerMessage::RequestIdentify(shard_id)
            | ShardManagerMessage::ScheduleIdentify(shard_id) => {
                drop(
                    self.shard_queuer
                        .unbounded_send(ShardQueuerMessage::ScheduleIdentify(shard_id)),
                );
            },
            ShardManagerMessage::UpdatePing(shard_id, latency) => {
                if let Some(runner) = self.runners.lock().await.get_mut(&shard_id) {
                    runner.latency = Some(latency);
                }
            },
            ShardManagerMessage::GatewayStatus(shard_id, outcome) => {
                drop(
                    self.shard_queuer
                        .unbounded_send(ShardQueuerMessage::IdentifyResult(shard_id, outcome)),
                );

                if outcome == IdentifyOutcome::Ready {
                    self.subscriptions.shard_online(shard_id);
                }
            },
            ShardManagerMessage::ConnectionStatusUpdate(shard_id, stage) => {
                if let Some(runner) = self.runners.lock().await.get_mut(&shard_id) {
                    runner.stage = stage;
                }
            },
            ShardManagerMessage::SessionData(shard_id, session) => {
                if let Some(runner) = self.runners.lock().await.get_mut(&shard_id) {
                    runner.session = session;
                }
            },
            ShardManagerMessage::ShutdownFinished(shard_id) => {
                if let Err(e) = self.shard_shutdown_send.unbounded_send(shard_id) {
                    warn!("failed to notify about finished shutdown: {e}");
                }
            },
            ShardManagerMessage::CannotReconnect {
                shard_id,
                code,
                reason,
            } => {
                self.handle_cannot_reconnect(shard_id, code, &reason).await;
            },
        }
    }

    /// Restart policy: a runner that gave up is removed, then respawned - unless it died to a
    /// fatal authentication or configuration close code, in which case the error is surfaced and
    /// the shard stays gone. The rest of the fleet is unaffected either way.
    async fn handle_cannot_reconnect(&self, shard_id: ShardId, code: Option<u16>, reason: &str) {
        let fleet_empty = {
            let mut runners = self.runners.lock().await;
            runners.remove(&shard_id);
            runners.is_empty()
        };

        if let Some(fatal) = code.and_then(fatal_close_error) {
            error!("[Shard {shard_id}] Not restarting: {reason}");
            self.subscriptions.error(&fatal);

            // One shard's fatal error never halts its peers, but when it took the last shard
            // standing there is no fleet left; surface that to the caller of `start`.
            if fleet_empty {
                self.return_with_value(Err(fatal)).await;
            }

            return;
        }

        info!("[Shard {shard_id}] Respawning: {reason}");
        drop(self.shard_queuer.unbounded_send(ShardQueuerMessage::Start(shard_id)));
    }

    /// Returns whether the shard manager contains either an active instance of a shard runner
    /// responsible for the given ID.
    ///
    /// If a shard has been queued but has not yet been initiated, then this will return `false`.
    pub async fn has(&self, shard_id: ShardId) -> bool {
        self.runners.lock().await.contains_key(&shard_id)
    }

    /// Initializes all given shards via the [`ShardQueuer`], which will spawn their runners and
    /// serialize their identifies.
    pub fn initialize(&self, shard_ids: &[ShardId], shard_total: NonZeroU16) {
        self.set_shard_total(shard_total);

        for &shard_id in shard_ids {
            self.boot(shard_id);
        }
    }

    /// Restarts a shard runner.
    ///
    /// This sends a shutdown signal to a shard's associated [`ShardRunner`], and then queues a
    /// initialization of a shard runner for the same shard via the [`ShardQueuer`].
    ///
    /// [`ShardRunner`]: super::ShardRunner
    pub async fn restart(&self, shard_id: ShardId) {
        info!("Restarting shard {shard_id}");
        self.shutdown(shard_id, 4000).await;
        self.boot(shard_id);
    }

    /// Asks a shard to reconnect gracefully: close with 4000 and resume on its preserved
    /// session. The runner handles this on its own; no respawn is involved.
    pub async fn reconnect(&self, shard_id: ShardId) {
        if let Some(runner) = self.runners.lock().await.get(&shard_id) {
            runner.runner_tx.reconnect();
        }
    }

    /// Returns the [`ShardId`]s of the shards that have been instantiated and currently have a
    /// valid [`ShardRunner`].
    ///
    /// [`ShardRunner`]: super::ShardRunner
    pub async fn shards_instantiated(&self) -> Vec<ShardId> {
        self.runners.lock().await.keys().copied().collect()
    }

    /// The arithmetic mean of the most recent heartbeat latency of every shard that has one.
    pub async fn average_ping(&self) -> Option<Duration> {
        let runners = self.runners.lock().await;
        let latencies: Vec<Duration> = runners.values().filter_map(|r| r.latency).collect();

        if latencies.is_empty() {
            return None;
        }

        let count = latencies.len() as u32;
        Some(latencies.into_iter().sum::<Duration>() / count)
    }

    /// The last session snapshot a shard reported, if any.
    ///
    /// Use [`Self::fetch_session_data`] to ask the runner for a fresh one first.
    pub async fn session_data(&self, shard_id: ShardId) -> Option<Session> {
        self.runners.lock().await.get(&shard_id).and_then(|runner| runner.session.clone())
    }

    /// Asks a runner to report its current session over the control channel. The reply lands in
    /// the runner info and can be read with [`Self::session_data`].
    pub async fn fetch_session_data(&self, shard_id: ShardId) {
        if let Some(runner) = self.runners.lock().await.get(&shard_id) {
            runner.runner_tx.fetch_session_data();
        }
    }

    /// Attempts to shut down the shard runner by Id.
    ///
    /// Returns a boolean indicating whether a shard runner was present. This is _not_ necessary
    /// an indicator of whether the shard runner was successfully shut down.
    ///
    /// **Note**: If the receiving end of an mpsc channel - owned by the shard runner - no longer
    /// exists, then the shard runner will not know it should shut down. This _should never
    /// happen_. It may already be stopped.
    pub async fn shutdown(&self, shard_id: ShardId, code: u16) {
        const TIMEOUT: tokio::time::Duration = tokio::time::Duration::from_secs(5);

        info!("Shutting down shard {}", shard_id);

        {
            let mut shard_shutdown = self.shard_shutdown.lock().await;

            drop(self.shard_queuer.unbounded_send(ShardQueuerMessage::ShutdownShard {
                shard_id,
                code,
            }));
            match timeout(TIMEOUT, shard_shutdown.next()).await {
                Ok(Some(shutdown_shard_id)) => {
                    if shutdown_shard_id != shard_id {
                        warn!(
                            "Failed to cleanly shutdown shard {}: Shutdown channel sent incorrect ID",
                            shard_id,
                        );
                    }
                },
                Ok(None) => (),
                Err(why) => {
                    warn!(
                        "Failed to cleanly shutdown shard {}, reached timeout: {:?}",
                        shard_id, why
                    );
                },
            }
            // shard_shutdown is dropped here and releases the lock
            // in theory we should never have two calls to shutdown()
            // at the same time but this is a safety measure just in case:tm:
        }

        self.runners.lock().await.remove(&shard_id);
    }

    /// Sends a shutdown message for all shards that the manager is responsible for that are still
    /// known to be running.
    ///
    /// If you only need to shutdown a select number of shards, prefer looping over the
    /// [`Self::shutdown`] method.
    pub async fn shutdown_all(&self) {
        let keys = {
            let runners = self.runners.lock().await;

            if runners.is_empty() {
                return;
            }

            runners.keys().copied().collect::<Vec<_>>()
        };

        info!("Shutting down all shards");

        for shard_id in keys {
            self.shutdown(shard_id, 1000).await;
        }

        drop(self.shard_queuer.unbounded_send(ShardQueuerMessage::Shutdown));

        // this message is received by Client::start, which lets the caller know the fleet is
        // gone and finally return
        drop(self.return_value_tx.lock().await.unbounded_send(Ok(())));
    }

    fn set_shard_total(&self, shard_total: NonZeroU16) {
        info!("Setting shard total to {shard_total}");

        let msg = ShardQueuerMessage::SetShardTotal(shard_total);
        drop(self.shard_queuer.unbounded_send(msg));
    }

    fn boot(&self, shard_id: ShardId) {
        info!("Telling shard queuer to start shard {shard_id}");

        drop(self.shard_queuer.unbounded_send(ShardQueuerMessage::Start(shard_id)));
    }

    /// Returns the gateway intents used for this gateway connection.
    #[must_use]
    pub fn intents(&self) -> GatewayIntents {
        self.gateway_intents
    }

    pub async fn return_with_value(&self, ret: Result<(), GatewayError>) {
        if let Err(e) = self.return_value_tx.lock().await.send(ret).await {
            warn!("failed to send return value: {}", e);
        }
    }
}

impl Drop for ShardManager {
    /// A custom drop implementation to clean up after the manager.
    ///
    /// This shuts down all active [`ShardRunner`]s and attempts to tell the [`ShardQueuer`] to
    /// shutdown.
    ///
    /// [`ShardRunner`]: super::ShardRunner
    fn drop(&mut self) {
        drop(self.shard_queuer.unbounded_send(ShardQueuerMessage::Shutdown));
    }
}

pub struct ShardManagerOptions {
    pub subscriptions: Arc<Subscriptions>,
    pub ws_url: Arc<str>,
    pub shard_total: NonZeroU16,
    pub http: Arc<Http>,
    pub intents: GatewayIntents,
    pub presence: Option<PresenceData>,
    pub token: SecretString,
    pub gateway_version: u8,
    pub large_threshold: u8,
    pub properties: IdentifyProperties,
    pub send_queue_high_water: usize,
}
