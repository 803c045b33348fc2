//! Builder Service. `spec.md` §4.G: wires B -> E -> F, emits `PayloadReadyEvent` on a
//! dispatcher, and runs the periodic per-slot cache cleanup.
//!
//! Grounded on `mev_boost_rs::service::Service::run`'s shape (build the components, spawn
//! one task per long-running loop, join them) generalized from its two fixed tasks to
//! this system's event-driven run-loop plus per-attempt scheduled-build tasks.

use crate::beacon_client::BeaconClient;
use crate::builder::PayloadBuilder;
use crate::cache::PayloadCache;
use crate::clock::SlotClock;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::engine::{EngineClient, JwtAuth};
use crate::event_stream::{AttributesCache, EventStream, StreamEvent, Subscription, TopicSet};
use crate::relay::{validator_cache::run_poll_loop, RelayClient, SubmissionTracker, ValidatorCache};
use crate::scheduler::SlotScheduler;
use crate::stats::Stats;
use crate::types::PayloadReadyEvent;
use ethereum_consensus::{crypto::SecretKey, primitives::BlsPublicKey, state_transition::Context};
use parking_lot::Mutex;
use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const CLEANUP_LOOKBACK_SLOTS: u64 = 64;

/// Tracks which slots already have a build in flight or completed, so a second
/// `payload_attributes` observation for the same slot is dropped (`spec.md` §4.G step 2).
#[derive(Default)]
struct BuildStartedSlots {
    slots: Mutex<HashSet<u64>>,
}

impl BuildStartedSlots {
    fn try_admit(&self, slot: u64) -> bool {
        self.slots.lock().insert(slot)
    }

    fn cleanup(&self, current_slot: u64) {
        let floor = current_slot.saturating_sub(CLEANUP_LOOKBACK_SLOTS);
        self.slots.lock().retain(|&slot| slot > floor);
    }
}

pub struct BuilderService {
    config: Config,
    clock: SlotClock,
    beacon: BeaconClient,
    event_stream: Arc<EventStream>,
    scheduler: Arc<SlotScheduler>,
    builder: Arc<PayloadBuilder>,
    cache: Arc<PayloadCache>,
    stats: Arc<Stats>,
    ready_dispatcher: Dispatcher<PayloadReadyEvent>,
    build_started: Arc<BuildStartedSlots>,
    cancel: CancellationToken,
    context: Arc<Context>,
    builder_signing_key: Option<Arc<SecretKey>>,
    builder_public_key: Option<BlsPublicKey>,
    relay_clients: Arc<Vec<RelayClient>>,
    validator_cache: Arc<ValidatorCache>,
    submission_tracker: Arc<SubmissionTracker>,
}

impl BuilderService {
    /// `spec.md` §4.G "Start sequence: fetch chain spec and genesis from beacon client".
    pub async fn new(config: Config) -> Result<Self, crate::error::Error> {
        let beacon = BeaconClient::new(config.beacon_api_endpoint.clone())
            .map_err(|e| crate::error::ConfigError::InvalidRelayUrl(config.beacon_api_endpoint.clone(), e))?;
        let genesis_time = beacon.genesis_time().await.map_err(crate::error::Error::Beacon)?;
        let seconds_per_slot = beacon.seconds_per_slot().await.map_err(crate::error::Error::Beacon)?;
        let clock = SlotClock::new(genesis_time, seconds_per_slot);

        let auth = JwtAuth::from_hex_file(&config.jwt_secret_path).map_err(crate::engine::Error::Jwt)?;
        let engine = EngineClient::new(&config.engine_api_endpoint, auth);
        let fee_recipient = config.fee_recipient()?;

        let builder = Arc::new(PayloadBuilder::new(
            engine,
            beacon.clone(),
            fee_recipient,
            Duration::from_millis(config.payload_build_time_ms),
        ));

        let relay_clients: Vec<RelayClient> = config
            .relays
            .iter()
            .map(|relay| RelayClient::new(relay.url.clone(), config.consensus_version.clone()))
            .collect();

        let (builder_signing_key, builder_public_key) = if relay_clients.is_empty() {
            (None, None)
        } else {
            let secret_key = config.builder_signing_key()?;
            let public_key = secret_key.public_key();
            (Some(Arc::new(secret_key)), Some(public_key))
        };

        Ok(Self {
            event_stream: Arc::new(EventStream::new(config.beacon_api_endpoint.clone())),
            scheduler: Arc::new(SlotScheduler::new(clock, config.schedule.clone())),
            builder,
            cache: Arc::new(PayloadCache::new(config.cache_size)),
            stats: Arc::new(Stats::new()),
            ready_dispatcher: Dispatcher::new(),
            build_started: Arc::new(BuildStartedSlots::default()),
            cancel: CancellationToken::new(),
            context: Arc::new(config.context()),
            builder_signing_key,
            builder_public_key,
            relay_clients: Arc::new(relay_clients),
            validator_cache: Arc::new(ValidatorCache::new()),
            submission_tracker: Arc::new(SubmissionTracker::new()),
            clock,
            beacon,
            config,
        })
    }

    pub fn subscribe_ready(&self, capacity: usize, lossy: bool) -> Subscription<PayloadReadyEvent> {
        self.ready_dispatcher.subscribe(capacity, lossy)
    }

    pub fn cache(&self) -> Arc<PayloadCache> {
        self.cache.clone()
    }

    pub fn stats(&self) -> Arc<Stats> {
        self.stats.clone()
    }

    /// Starts the event stream and runs the selection run-loop until stopped.
    pub async fn run(&self) -> Result<(), crate::error::Error> {
        self.event_stream.start(TopicSet::default())?;
        let attributes_cache = self.event_stream.attributes_cache();
        let mut subscription = self.event_stream.dispatcher().subscribe(256, true);

        let mut tasks: JoinSet<()> = JoinSet::new();

        if !self.relay_clients.is_empty() {
            self.spawn_validator_poll_task(&mut tasks);
            self.spawn_bid_submission_task(&mut tasks);
        }

        loop {
            tokio::select! {
                event = subscription.recv() => {
                    match event {
                        Some(StreamEvent::PayloadAttributes(attrs)) => {
                            self.handle_payload_attributes(attrs, attributes_cache.clone(), &mut tasks);
                        }
                        Some(StreamEvent::Head(head)) => {
                            tracing::debug!(slot = head.slot, "head event");
                        }
                        Some(StreamEvent::ExecutionPayloadEnvelope(_))
                        | Some(StreamEvent::ExecutionPayloadBid(_))
                        | Some(StreamEvent::ExecutionPayloadAvailable(_)) => {
                            // updates last-known-payload state only; never triggers a build
                            // directly (`spec.md` §9 open question).
                        }
                        None => break,
                    }
                }
                _ = self.cancel.cancelled() => break,
            }
        }

        while tasks.join_next().await.is_some() {}
        Ok(())
    }

    pub async fn stop(&self) {
        self.cancel.cancel();
        self.event_stream.stop().await;
    }

    /// `spec.md` §5 "1 relay-polling task": refreshes `ValidatorCache` from every
    /// configured relay's registered-validators listing every `validator_poll_secs`.
    fn spawn_validator_poll_task(&self, tasks: &mut JoinSet<()>) {
        let cache = self.validator_cache.clone();
        let relay_clients = self.relay_clients.clone();
        let interval = Duration::from_secs(self.config.validator_poll_secs.max(1));
        let cancel = self.cancel.clone();

        tasks.spawn(async move {
            tokio::select! {
                _ = run_poll_loop(cache, interval, move || {
                    let relay_clients = relay_clients.clone();
                    async move { poll_registered_validators(&relay_clients).await }
                }) => {}
                _ = cancel.cancelled() => {}
            }
        });
    }

    /// `spec.md` §5 "0..K per-relay-submission tasks, spawned per bid": subscribes to
    /// `PayloadReadyEvent`s and, for each, submits a bid if the slot's proposer is
    /// registered with a relay (`spec.md` §4.H).
    fn spawn_bid_submission_task(&self, tasks: &mut JoinSet<()>) {
        let mut subscription = self.subscribe_ready(64, true);
        let beacon = self.beacon.clone();
        let validator_cache = self.validator_cache.clone();
        let relay_clients = self.relay_clients.clone();
        let context = self.context.clone();
        let builder_signing_key =
            self.builder_signing_key.clone().expect("signing key present whenever relay_clients is non-empty");
        let builder_public_key =
            self.builder_public_key.expect("public key present whenever relay_clients is non-empty");
        let submission_tracker = self.submission_tracker.clone();
        let cancel = self.cancel.clone();

        tasks.spawn(async move {
            loop {
                let event = tokio::select! {
                    event = subscription.recv() => event,
                    _ = cancel.cancelled() => break,
                };
                let Some(event) = event else { break };

                let beacon = beacon.clone();
                let validator_cache = validator_cache.clone();
                let relay_clients = relay_clients.clone();
                let context = context.clone();
                let builder_signing_key = builder_signing_key.clone();
                let builder_public_key = builder_public_key.clone();
                let submission_tracker = submission_tracker.clone();

                tokio::spawn(async move {
                    submit_bid_for_event(
                        event,
                        beacon,
                        validator_cache,
                        relay_clients,
                        context,
                        builder_signing_key,
                        builder_public_key,
                        submission_tracker,
                    )
                    .await;
                });
            }
        });
    }

    /// `spec.md` §4.G steps 2-5.
    fn handle_payload_attributes(
        &self,
        attrs: crate::event_stream::PayloadAttributesEvent,
        attributes_cache: Arc<AttributesCache>,
        tasks: &mut JoinSet<()>,
    ) {
        let slot = attrs.proposal_slot;

        if !self.scheduler.should_build_for_slot(slot) {
            return;
        }
        if !self.build_started.try_admit(slot) {
            return;
        }

        let delay = self.delay_until_build_time(slot);

        let builder = self.builder.clone();
        let scheduler = self.scheduler.clone();
        let cache = self.cache.clone();
        let stats = self.stats.clone();
        let dispatcher = self.ready_dispatcher.clone();
        let cancel = self.cancel.clone();
        let deadline = self.config.build_deadline();

        tasks.spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return,
                }
            }
            // re-read the latest cached attributes at execution time: the parent block
            // may have changed since this task was scheduled (`spec.md` §4.G step 3).
            let attrs = attributes_cache.get_latest(slot).unwrap_or(attrs);

            stats.build_attempted();
            let result = tokio::time::timeout(deadline, builder.build_payload_from_attributes(&attrs)).await;
            match result {
                Ok(Ok(event)) => {
                    cache.insert(event.clone());
                    dispatcher.fire(event);
                    scheduler.on_slot_built(slot);
                    stats.build_succeeded();
                }
                Ok(Err(crate::builder::Error::Cancelled(_))) => {
                    stats.build_cancelled();
                }
                Ok(Err(err)) => {
                    tracing::error!(slot, err = %err, "build failed; abandoning slot");
                    stats.build_failed();
                }
                Err(_) => {
                    tracing::error!(slot, "build attempt deadline exceeded; abandoning slot");
                    stats.build_failed();
                }
            }

            if slot > CLEANUP_LOOKBACK_SLOTS {
                let floor = slot - CLEANUP_LOOKBACK_SLOTS;
                cache.cleanup(slot);
                attributes_cache.cleanup(floor);
            }
        });

        self.build_started.cleanup(slot);
    }

    /// `buildTime = slotStart(slot) + buildStartTime_ms` (signed; negative means before
    /// slot start). Returns zero if that instant has already passed (`spec.md` §4.G step 3).
    fn delay_until_build_time(&self, slot: u64) -> Duration {
        let slot_start = self.clock.slot_to_time(slot) as i128 * 1000;
        let build_time_ms = slot_start + self.config.build_start_time_ms as i128;
        let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).expect("after epoch").as_millis() as i128;
        let delay_ms = build_time_ms - now_ms;
        if delay_ms <= 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(delay_ms as u64)
        }
    }
}

/// Fetches each relay's registered validators concurrently and merges the results; a
/// single relay's failure is logged and excluded rather than failing the whole refresh
/// (`spec.md` §4.H: the cache keeps its stale-but-present snapshot on poll failure).
async fn poll_registered_validators(
    relay_clients: &[RelayClient],
) -> Result<Vec<(BlsPublicKey, crate::relay::validator_cache::RelayRegistration)>, crate::relay::RelayClientError> {
    let results = futures::future::join_all(relay_clients.iter().map(|client| client.get_registered_validators())).await;
    let mut merged = Vec::new();
    for (client, result) in relay_clients.iter().zip(results) {
        match result {
            Ok(entries) => merged.extend(entries),
            Err(err) => tracing::warn!(relay = client.url(), err = %err, "failed to fetch registered validators"),
        }
    }
    Ok(merged)
}

/// Resolves the slot's proposer, checks relay registration, and submits a bid if
/// registered (`spec.md` §2 "G emits PayloadReady -> ... H", §4.H).
#[allow(clippy::too_many_arguments)]
async fn submit_bid_for_event(
    event: PayloadReadyEvent,
    beacon: BeaconClient,
    validator_cache: Arc<ValidatorCache>,
    relay_clients: Arc<Vec<RelayClient>>,
    context: Arc<Context>,
    builder_signing_key: Arc<SecretKey>,
    builder_public_key: BlsPublicKey,
    submission_tracker: Arc<SubmissionTracker>,
) {
    let proposer_public_key = match beacon.validator_pubkey(event.proposer_index).await {
        Ok(key) => key,
        Err(err) => {
            tracing::error!(slot = event.slot, err = %err, "failed to resolve proposer pubkey; skipping bid submission");
            return;
        }
    };

    let Some(registration) = validator_cache.get(&proposer_public_key) else {
        tracing::debug!(slot = event.slot, "proposer not registered with any relay; skipping bid submission");
        return;
    };

    let bid_value = ethereum_consensus::primitives::U256::from(event.block_value_gwei)
        * ethereum_consensus::primitives::U256::from(1_000_000_000u64);

    match crate::relay::submit_bid(
        &event,
        &proposer_public_key,
        &builder_public_key,
        registration.fee_recipient,
        bid_value,
        &builder_signing_key,
        &context,
        &relay_clients,
        &submission_tracker,
    )
    .await
    {
        Ok(outcomes) => {
            for outcome in outcomes {
                if let Err(err) = outcome.result {
                    tracing::warn!(slot = event.slot, relay = %outcome.relay_url, err = %err, "relay rejected bid submission");
                }
            }
        }
        Err(err) => tracing::error!(slot = event.slot, err = %err, "bid submission failed"),
    }
}
