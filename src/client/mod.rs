//! A high-level interface over the sharded gateway connection.
//!
//! A [`Client`] owns an HTTP client for the gateway metadata endpoints, a [`ShardManager`] for
//! the fleet, and the subscriber registry the fleet's dispatches fan out to. Construct one with
//! [`Client::builder`], register subscriptions, then call [`Client::start`]:
//!
//! ```rust,no_run
//! use tempest::client::Client;
//! use tempest::model::event::{Event, EventType};
//! use tempest::model::gateway::GatewayIntents;
//!
//! # async fn run() -> Result<(), tempest::Error> {
//! let mut client = Client::builder_from_env(GatewayIntents::non_privileged()).build().await?;
//!
//! client.subscribe(EventType::MessageCreate, |shard_id, event| {
//!     if let Event::MessageCreate(ev) = event {
//!         println!("[shard {shard_id}] {}", ev.message.content);
//!     }
//! });
//!
//! client.start().await
//! # }
//! ```

pub mod dispatch;

use std::env;
use std::num::NonZeroU16;
use std::sync::Arc;

use futures::channel::mpsc::UnboundedReceiver as Receiver;
use futures::StreamExt;
use tracing::warn;

pub use self::dispatch::Subscriptions;
use crate::constants;
use crate::gateway::{
    GatewayError,
    IdentifyProperties,
    PresenceData,
    ShardManager,
    ShardManagerOptions,
    DEFAULT_SEND_QUEUE_HIGH_WATER,
};
use crate::http::Http;
use crate::internal::prelude::*;
use crate::model::event::{Event, EventType};
use crate::model::gateway::GatewayIntents;
use crate::model::id::ShardId;

/// Which shards this process is responsible for.
#[derive(Clone, Debug, Default)]
pub enum ShardPlan {
    /// Use the shard count the gateway recommends, running all of them here.
    #[default]
    Auto,
    /// Run shards `0..N`, with `N` as the total.
    Count(NonZeroU16),
    /// Run exactly these shard ids. The total must be supplied separately, since other processes
    /// presumably run the rest.
    List(Vec<u16>),
}

impl ShardPlan {
    /// Resolves the plan into the concrete shard ids to run and the fleet-wide total.
    ///
    /// `recommended` is the count advertised by the gateway; `total_override` is the
    /// configured total, required for [`ShardPlan::List`].
    pub(crate) fn compute(
        &self,
        recommended: NonZeroU16,
        total_override: Option<NonZeroU16>,
    ) -> Result<(Vec<ShardId>, NonZeroU16)> {
        match self {
            Self::Auto => {
                let total = recommended;
                Ok(((0..total.get()).map(ShardId).collect(), total))
            },
            Self::Count(count) => Ok(((0..count.get()).map(ShardId).collect(), *count)),
            Self::List(ids) => {
                let Some(total) = total_override else {
                    return Err(Error::Other(
                        "a shard list requires the total shard count to be configured",
                    ));
                };

                if ids.is_empty() {
                    return Err(Error::Other("the shard list must not be empty"));
                }

                if ids.iter().any(|&id| id >= total.get()) {
                    return Err(Error::Other("shard ids must be below the total shard count"));
                }

                Ok((ids.iter().copied().map(ShardId).collect(), total))
            },
        }
    }
}

/// A builder for a [`Client`]. Finish with [`ClientBuilder::build`].
#[must_use = "the builder does nothing until built"]
pub struct ClientBuilder {
    token: Option<String>,
    intents: GatewayIntents,
    shard_plan: ShardPlan,
    total_shards: Option<NonZeroU16>,
    gateway_version: u8,
    large_threshold: u8,
    presence: Option<PresenceData>,
    properties: IdentifyProperties,
    send_queue_high_water: usize,
}

impl ClientBuilder {
    fn with_token(token: Option<String>, intents: GatewayIntents) -> Self {
        Self {
            token,
            intents,
            shard_plan: ShardPlan::Auto,
            total_shards: None,
            gateway_version: constants::GATEWAY_VERSION,
            large_threshold: constants::LARGE_THRESHOLD,
            presence: None,
            properties: IdentifyProperties::default(),
            send_queue_high_water: DEFAULT_SEND_QUEUE_HIGH_WATER,
        }
    }

    /// Sets which shards to run. Defaults to [`ShardPlan::Auto`].
    pub fn shards(mut self, plan: ShardPlan) -> Self {
        self.shard_plan = plan;
        self
    }

    /// Sets the fleet-wide shard total. Required with [`ShardPlan::List`].
    pub fn total_shards(mut self, total: NonZeroU16) -> Self {
        self.total_shards = Some(total);
        self
    }

    /// Sets the gateway protocol version to connect with.
    pub fn gateway_version(mut self, version: u8) -> Self {
        self.gateway_version = version;
        self
    }

    /// Sets the `large_threshold` sent on identify. Values are clamped into the gateway's
    /// accepted `50..=250` range.
    pub fn large_threshold(mut self, threshold: u8) -> Self {
        self.large_threshold = threshold.clamp(50, 250);
        self
    }

    /// Sets the presence every shard identifies with.
    pub fn presence(mut self, presence: PresenceData) -> Self {
        self.presence = Some(presence);
        self
    }

    /// Sets the identify connection properties (`os`, `browser`, `device`).
    pub fn properties(mut self, properties: IdentifyProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Sets how many outbound payloads a shard may have queued before it declares its connection
    /// unserviceable and reconnects.
    pub fn send_queue_high_water(mut self, high_water: usize) -> Self {
        self.send_queue_high_water = high_water;
        self
    }

    /// Builds the [`Client`]: resolves the token, fetches the gateway metadata, computes the
    /// shard plan and assembles the manager. No shard is started yet; that happens in
    /// [`Client::start`].
    ///
    /// # Errors
    ///
    /// Errors if no token can be resolved, the token is malformed, the gateway metadata request
    /// fails, or the shard configuration is inconsistent.
    pub async fn build(self) -> Result<Client> {
        let token = match self.token {
            Some(token) if !token.trim().is_empty() => token,
            _ => env::var("DISCORD_TOKEN").map_err(|_| {
                Error::Other("no token was provided and DISCORD_TOKEN is not set")
            })?,
        };

        let http = Arc::new(Http::new(&token)?);

        let bot_gateway = http.get_bot_gateway().await?;
        let (shard_ids, shard_total) =
            self.shard_plan.compute(bot_gateway.shards, self.total_shards)?;

        let subscriptions = Arc::new(Subscriptions::default());

        let (shard_manager, return_value_rx) = ShardManager::new(ShardManagerOptions {
            subscriptions: Arc::clone(&subscriptions),
            ws_url: Arc::from(bot_gateway.url),
            shard_total,
            http: Arc::clone(&http),
            intents: self.intents,
            presence: self.presence,
            token: http.token().clone(),
            gateway_version: self.gateway_version,
            large_threshold: self.large_threshold,
            properties: self.properties,
            send_queue_high_water: self.send_queue_high_water,
        });

        Ok(Client {
            http,
            shard_manager,
            subscriptions,
            shard_ids,
            shard_total,
            return_value_rx,
        })
    }
}

/// The sharded gateway client: one logical event stream over N shard connections.
pub struct Client {
    /// The HTTP client the manager polls gateway metadata with.
    pub http: Arc<Http>,
    /// The manager owning the fleet of shard runners.
    pub shard_manager: Arc<ShardManager>,
    subscriptions: Arc<Subscriptions>,
    shard_ids: Vec<ShardId>,
    shard_total: NonZeroU16,
    return_value_rx: Receiver<StdResult<(), GatewayError>>,
}

impl Client {
    /// Creates a builder with an explicit token.
    pub fn builder(token: impl Into<String>, intents: GatewayIntents) -> ClientBuilder {
        ClientBuilder::with_token(Some(token.into()), intents)
    }

    /// Creates a builder that takes its token from the `DISCORD_TOKEN` environment variable at
    /// build time.
    pub fn builder_from_env(intents: GatewayIntents) -> ClientBuilder {
        ClientBuilder::with_token(None, intents)
    }

    /// Registers `handler` for every dispatch of type `kind`, on any shard.
    ///
    /// Handlers run synchronously in subscription order; dispatches from one shard reach them in
    /// the exact order the gateway emitted them.
    pub fn subscribe(
        &self,
        kind: EventType,
        handler: impl Fn(ShardId, &Event) + Send + Sync + 'static,
    ) {
        self.subscriptions.subscribe(kind, Arc::new(handler));
    }

    /// Registers a handler for debug breadcrumbs.
    pub fn on_debug(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.subscriptions.on_debug(Arc::new(handler));
    }

    /// Registers a handler for fatal per-shard errors.
    pub fn on_error(&self, handler: impl Fn(&GatewayError) + Send + Sync + 'static) {
        self.subscriptions.on_error(Arc::new(handler));
    }

    /// Registers a handler called with the shard id whenever a shard reaches Ready.
    pub fn on_shard_online(&self, handler: impl Fn(ShardId) + Send + Sync + 'static) {
        self.subscriptions.on_shard_online(Arc::new(handler));
    }

    /// The shard ids this client will run, as resolved from its configuration.
    #[must_use]
    pub fn shard_ids(&self) -> &[ShardId] {
        &self.shard_ids
    }

    /// Starts the fleet and parks until it is destroyed.
    ///
    /// All configured shards are handed to the manager, which spawns their runners and admits
    /// their identifies one at a time. This returns once [`Client::destroy`] (or
    /// [`ShardManager::shutdown_all`]) completes.
    ///
    /// # Errors
    ///
    /// Errors if the manager reports a fleet-wide failure.
    pub async fn start(&mut self) -> Result<()> {
        self.shard_manager.initialize(&self.shard_ids, self.shard_total);

        match self.return_value_rx.next().await {
            Some(Ok(())) | None => Ok(()),
            Some(Err(why)) => {
                warn!("Fleet stopped: {why:?}");

                Err(Error::Gateway(why))
            },
        }
    }

    /// Destroys the fleet: every shard closes with code 1000, heartbeat timers are released, and
    /// no further dispatches are emitted.
    pub async fn destroy(&self) {
        self.shard_manager.shutdown_all().await;
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU16;

    use super::ShardPlan;
    use crate::model::id::ShardId;

    fn nz(n: u16) -> NonZeroU16 {
        NonZeroU16::new(n).unwrap()
    }

    #[test]
    fn auto_plan_uses_the_recommended_count() {
        let (ids, total) = ShardPlan::Auto.compute(nz(3), None).unwrap();

        assert_eq!(ids, vec![ShardId(0), ShardId(1), ShardId(2)]);
        assert_eq!(total.get(), 3);
    }

    #[test]
    fn counted_plan_enumerates_from_zero() {
        let (ids, total) = ShardPlan::Count(nz(2)).compute(nz(10), None).unwrap();

        assert_eq!(ids, vec![ShardId(0), ShardId(1)]);
        assert_eq!(total.get(), 2);
    }

    #[test]
    fn listed_plan_requires_a_total() {
        let plan = ShardPlan::List(vec![2, 5]);

        assert!(plan.compute(nz(10), None).is_err());

        let (ids, total) = plan.compute(nz(10), Some(nz(8))).unwrap();
        assert_eq!(ids, vec![ShardId(2), ShardId(5)]);
        assert_eq!(total.get(), 8);
    }

    #[test]
    fn listed_plan_rejects_out_of_range_ids() {
        let plan = ShardPlan::List(vec![0, 8]);

        assert!(plan.compute(nz(10), Some(nz(8))).is_err());
    }

    #[test]
    fn empty_list_is_a_configuration_error() {
        assert!(ShardPlan::List(Vec::new()).compute(nz(1), Some(nz(1))).is_err());
    }
}
