use std::collections::{HashMap, VecDeque};
use std::num::NonZeroU16;
use std::sync::Arc;

use futures::channel::mpsc::{UnboundedReceiver as Receiver, UnboundedSender as Sender};
use futures::StreamExt;
use secrecy::SecretString;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    IdentifyOutcome,
    ShardManagerMessage,
    ShardMessenger,
    ShardQueuerMessage,
    ShardRunner,
    ShardRunnerInfo,
    ShardRunnerMessage,
    ShardRunnerOptions,
};
use crate::gateway::{
    ConnectionStage,
    IdentifyProperties,
    PresenceData,
    Shard,
    ShardOptions,
};
use crate::http::Http;
use crate::internal::prelude::*;
use crate::internal::tokio::spawn_named;
use crate::model::gateway::{GatewayIntents, ShardInfo};
use crate::model::id::ShardId;

/// The gateway's identify rate limit: one identify per bucket per 5 seconds. The queue enforces
/// the spacing itself instead of relying on the server to reject.
const WAIT_BETWEEN_IDENTIFIES_IN_SECONDS: u64 = 5;

/// How long an admitted shard gets to report its identify outcome before the slot is reclaimed
/// and the shard is re-queued.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(60);

/// An admission that has been granted and whose outcome is still owed.
#[derive(Debug)]
pub struct PendingIdentify {
    pub shard_id: ShardId,
    pub granted_at: Instant,
}

/// The shard queuer is a loop that runs indefinitely to manage the startup of shards.
///
/// It has two jobs:
///
/// - spawning shard runners on request (and respawning them when the manager asks);
/// - serializing every identify in the fleet through one admission slot, so that the remote
///   session start limit is honored and identifies are spaced at least 5 seconds apart.
///
/// An instance should be run in its own task, due to the blocking nature of the loop itself as
/// well as the sleeps it performs between identifies.
pub struct ShardQueuer {
    /// The REST client used to poll the session start limit before every admission.
    pub http: Arc<Http>,
    /// The sender cloned into every spawned runner for its half of the control channel.
    pub manager_tx: Sender<ShardManagerMessage>,
    /// The instant the last admission slot was released.
    ///
    /// This is used to determine how long to wait between shard IDENTIFYs.
    pub last_admission: Option<Instant>,
    /// The shards that are waiting for identify admission.
    pub queue: IdentifyQueue,
    /// The admission currently in flight, if any. At most one exists at any instant.
    pub pending: Option<PendingIdentify>,
    /// Shards whose runners still need to be spawned.
    pub pending_spawns: VecDeque<ShardId>,
    /// A copy of the map of shard runners.
    pub runners: Arc<Mutex<HashMap<ShardId, ShardRunnerInfo>>>,
    /// A receiver channel for the shard queuer to be told what to do.
    pub rx: Receiver<ShardQueuerMessage>,
    /// A copy of the URL to use to connect to the gateway.
    pub ws_url: Arc<str>,
    /// The total amount of shards to start.
    pub shard_total: NonZeroU16,
    pub intents: GatewayIntents,
    pub presence: Option<PresenceData>,
    pub token: SecretString,
    pub gateway_version: u8,
    pub large_threshold: u8,
    pub properties: IdentifyProperties,
    pub send_queue_high_water: usize,
}

impl ShardQueuer {
    /// Begins the shard queuer loop.
    ///
    /// This will loop over the internal [`Self::rx`] for [`ShardQueuerMessage`]s, blocking for
    /// messages on what to do. Between messages - at most every second - it performs one pass of
    /// queue work: spawning a pending runner, reclaiming a timed out admission, or granting the
    /// next identify if the slot is free and the cooldown has passed.
    ///
    /// If a [`ShardQueuerMessage::Shutdown`] is received, this will return and the loop will be
    /// over.
    ///
    /// **Note**: This should be run in its own task due to the blocking nature of the loop.
    pub async fn run(&mut self) {
        const TIMEOUT: Duration = Duration::from_secs(1);

        loop {
            match timeout(TIMEOUT, self.rx.next()).await {
                Ok(Some(msg)) => {
                    if !self.handle_message(msg).await {
                        break;
                    }
                },
                Ok(None) => break,
                Err(_) => {},
            }

            self.process().await;
        }
    }

    async fn handle_message(&mut self, msg: ShardQueuerMessage) -> bool {
        match msg {
            ShardQueuerMessage::SetShardTotal(shard_total) => {
                self.shard_total = shard_total;
            },
            ShardQueuerMessage::Start(shard_id) => {
                debug!("[Shard Queuer] Received to start shard {shard_id}");
                self.pending_spawns.push_back(shard_id);
            },
            ShardQueuerMessage::ScheduleIdentify(shard_id) => {
                debug!("[Shard Queuer] Queueing identify for shard {shard_id}");
                self.queue.push_back(shard_id);
            },
            ShardQueuerMessage::IdentifyResult(shard_id, outcome) => {
                self.handle_identify_result(shard_id, outcome);
            },
            ShardQueuerMessage::ShutdownShard {
                shard_id,
                code,
            } => {
                debug!(
                    "[Shard Queuer] Received to shutdown shard {} with code {}",
                    shard_id.0, code
                );
                self.shutdown(shard_id, code).await;
            },
            ShardQueuerMessage::Shutdown => {
                debug!("[Shard Queuer] Received to shutdown all shards");
                self.shutdown_runners().await;
                return false;
            },
        }

        true
    }

    /// One pass of queue work.
    async fn process(&mut self) {
        // One spawn attempt per pass; a failed spawn goes to the back and is retried no more
        // often than the loop ticks.
        if let Some(shard_id) = self.pending_spawns.pop_front() {
            if let Err(why) = self.spawn(shard_id).await {
                warn!("[Shard Queuer] Err starting shard {shard_id}: {why:?}");
                info!("[Shard Queuer] Re-queueing start of shard {shard_id}");

                self.pending_spawns.push_back(shard_id);
            }
        }

        self.reclaim_timed_out_admission();

        if self.pending.is_some() {
            return;
        }

        if let Some(last) = self.last_admission {
            // We must wait 5 seconds between IDENTIFYs to avoid session invalidations.
            if last.elapsed() < Duration::from_secs(WAIT_BETWEEN_IDENTIFIES_IN_SECONDS) {
                return;
            }
        }

        let Some(shard_id) = self.queue.pop_front() else {
            return;
        };

        self.admit(shard_id).await;
    }

    /// Grants the admission slot to `shard_id`.
    ///
    /// The session start limit is re-polled before every grant; stale `remaining` data is how
    /// accidental identify storms happen. When the budget is exhausted, the whole queue sleeps
    /// out the advertised reset window.
    async fn admit(&mut self, shard_id: ShardId) {
        match self.http.get_bot_gateway().await {
            Ok(gateway) => {
                let limit = gateway.session_start_limit;

                if limit.remaining == 0 {
                    info!(
                        "[Shard Queuer] Session start limit exhausted; sleeping {}ms",
                        limit.reset_after,
                    );

                    sleep(Duration::from_millis(limit.reset_after)).await;
                }
            },
            Err(why) => {
                // The admission proceeds regardless; blocking every identify on REST health
                // would take the whole fleet down with it.
                warn!("[Shard Queuer] Err polling session start limit: {why:?}");
            },
        }

        let runner_tx = {
            let runners = self.runners.lock().await;
            runners.get(&shard_id).map(|runner| runner.runner_tx.clone())
        };

        let Some(runner_tx) = runner_tx else {
            warn!("[Shard Queuer] Shard {shard_id} queued for identify but has no runner");

            return;
        };

        debug!("[Shard Queuer] Granting identify to shard {shard_id}");
        runner_tx.send_to_shard(ShardRunnerMessage::Identify);

        self.pending = Some(PendingIdentify {
            shard_id,
            granted_at: Instant::now(),
        });
    }

    fn reclaim_timed_out_admission(&mut self) {
        let Some(pending) = &self.pending else {
            return;
        };

        if pending.granted_at.elapsed() < IDENTIFY_TIMEOUT {
            return;
        }

        let shard_id = pending.shard_id;
        warn!("[Shard Queuer] Shard {shard_id} never reported its identify outcome; re-queueing");

        self.pending = None;
        self.last_admission = Some(Instant::now());
        self.queue.push_back(shard_id);
    }

    fn handle_identify_result(&mut self, shard_id: ShardId, outcome: IdentifyOutcome) {
        let Some(pending) = &self.pending else {
            debug!("[Shard Queuer] Stray identify result from shard {shard_id}");

            return;
        };

        if pending.shard_id != shard_id {
            debug!("[Shard Queuer] Identify result from shard {shard_id} without the slot");

            return;
        }

        // Release the slot; the cooldown before the next grant runs from now either way, since
        // an IDENTIFY went over the wire.
        self.pending = None;
        self.last_admission = Some(Instant::now());

        match outcome {
            IdentifyOutcome::Ready => {
                debug!("[Shard Queuer] Shard {shard_id} identified");
            },
            IdentifyOutcome::InvalidSession => {
                info!("[Shard Queuer] Shard {shard_id} got an invalid session; re-queueing");
                self.queue.push_back(shard_id);
            },
        }
    }

    async fn spawn(&mut self, shard_id: ShardId) -> Result<()> {
        let shard = Shard::new(ShardOptions {
            ws_url: Arc::clone(&self.ws_url),
            token: self.token.clone(),
            shard_info: ShardInfo::new(shard_id, self.shard_total),
            intents: self.intents,
            gateway_version: self.gateway_version,
            large_threshold: self.large_threshold,
            presence: self.presence.clone(),
            properties: self.properties.clone(),
        })
        .await?;

        let mut runner = ShardRunner::new(ShardRunnerOptions {
            manager_tx: self.manager_tx.clone(),
            shard,
            send_queue_high_water: self.send_queue_high_water,
        });

        let runner_info = ShardRunnerInfo {
            latency: None,
            runner_tx: ShardMessenger::new(&runner),
            stage: ConnectionStage::Handshake,
            session: None,
        };

        spawn_named("shard_runner::run", async move {
            drop(runner.run().await);
            debug!("[ShardRunner {}] Stopping", runner.shard.shard_info());
        });

        self.runners.lock().await.insert(shard_id, runner_info);

        Ok(())
    }

    async fn shutdown_runners(&mut self) {
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
    }

    /// Attempts to shut down the shard runner by Id.
    ///
    /// **Note**: If the receiving end of an mpsc channel - owned by the shard runner - no longer
    /// exists, then the shard runner will not know it should shut down. This _should never
    /// happen_. It may already be stopped.
    pub async fn shutdown(&mut self, shard_id: ShardId, code: u16) {
        info!("Shutting down shard {}", shard_id);

        if let Some(runner) = self.runners.lock().await.get(&shard_id) {
            let msg = ShardRunnerMessage::Shutdown(shard_id, code);

            if let Err(why) = runner.runner_tx.tx.unbounded_send(msg) {
                warn!(
                    "Failed to cleanly shutdown shard {} when sending message to shard runner: {:?}",
                    shard_id,
                    why,
                );
            }
        }
    }
}

/// The FIFO of shards waiting for identify admission.
///
/// A shard appears at most once: re-requesting admission while already queued is a no-op, so a
/// runner re-asking after e.g. a reconnect cannot earn itself two identifies.
#[derive(Debug, Default)]
#[must_use]
pub struct IdentifyQueue {
    inner: VecDeque<ShardId>,
}

impl IdentifyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a shard to the tail of the queue, unless it is already waiting.
    pub fn push_back(&mut self, shard_id: ShardId) {
        if !self.inner.contains(&shard_id) {
            self.inner.push_back(shard_id);
        }
    }

    /// Pops the shard whose turn it is.
    pub fn pop_front(&mut self) -> Option<ShardId> {
        self.inner.pop_front()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::IdentifyQueue;
    use crate::model::id::ShardId;

    #[test]
    fn admission_is_first_come_first_served() {
        let mut queue = IdentifyQueue::new();
        queue.push_back(ShardId(0));
        queue.push_back(ShardId(1));
        queue.push_back(ShardId(2));

        assert_eq!(queue.pop_front(), Some(ShardId(0)));
        assert_eq!(queue.pop_front(), Some(ShardId(1)));
        assert_eq!(queue.pop_front(), Some(ShardId(2)));
        assert_eq!(queue.pop_front(), None);
    }

    #[test]
    fn requeue_goes_to_the_tail() {
        let mut queue = IdentifyQueue::new();
        queue.push_back(ShardId(0));
        queue.push_back(ShardId(1));

        // Shard 0 is admitted, gets an invalid session, and is re-queued.
        let admitted = queue.pop_front();
        assert_eq!(admitted, Some(ShardId(0)));
        queue.push_back(ShardId(0));

        assert_eq!(queue.pop_front(), Some(ShardId(1)));
        assert_eq!(queue.pop_front(), Some(ShardId(0)));
    }

    #[test]
    fn double_requests_collapse() {
        let mut queue = IdentifyQueue::new();
        queue.push_back(ShardId(7));
        queue.push_back(ShardId(7));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop_front(), Some(ShardId(7)));
        assert!(queue.is_empty());
    }
}
