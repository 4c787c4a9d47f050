use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crowdfund_service::{CampaignService, NewDonation, ServiceError, ServiceResult};
use crowdfund_types::events::{ChainEvent, ReconcilerState};

use crate::ChainError;
use crate::gateway::{ChainGateway, EventStream};

/// Wait after a failed first subscription attempt.
pub const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(30);
/// Wait before resubscribing after an established subscription drops.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Background task that mirrors contract events into the campaign store.
///
/// Owns the subscription lifecycle: connect, listen, and on failure tear the
/// subscription down and resubscribe after a delay. A configuration error is
/// permanent and leaves the reconciler disconnected. Donation events go
/// through [`CampaignService::record_donation`], so replays are idempotent.
pub struct Reconciler<G> {
    gateway: Arc<G>,
    campaigns: CampaignService,
    state: watch::Sender<ReconcilerState>,
    cancel: CancellationToken,
    initial_retry: Duration,
    reconnect_delay: Duration,
}

/// Owner-side handle to a running reconciler.
pub struct ReconcilerHandle {
    state: watch::Receiver<ReconcilerState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

enum ListenEnd {
    Cancelled,
    Dropped(String),
}

impl<G: ChainGateway> Reconciler<G> {
    /// Starts the reconciler. Without a gateway it stays
    /// [`ReconcilerState::Disconnected`] and no task is spawned.
    pub fn spawn(gateway: Option<Arc<G>>, campaigns: CampaignService) -> ReconcilerHandle {
        Self::spawn_with_delays(gateway, campaigns, INITIAL_RETRY_DELAY, RECONNECT_DELAY)
    }

    pub fn spawn_with_delays(
        gateway: Option<Arc<G>>,
        campaigns: CampaignService,
        initial_retry: Duration,
        reconnect_delay: Duration,
    ) -> ReconcilerHandle {
        let (state, state_rx) = watch::channel(ReconcilerState::Disconnected);
        let cancel = CancellationToken::new();

        let Some(gateway) = gateway else {
            warn!("Chain gateway not configured, reconciler disabled");
            return ReconcilerHandle {
                state: state_rx,
                cancel,
                task: None,
            };
        };

        let reconciler = Self {
            gateway,
            campaigns,
            state,
            cancel: cancel.clone(),
            initial_retry,
            reconnect_delay,
        };
        let task = tokio::spawn(reconciler.run());

        ReconcilerHandle {
            state: state_rx,
            cancel,
            task: Some(task),
        }
    }

    async fn run(self) {
        let mut delay = self.initial_retry;
        self.set_state(ReconcilerState::Connecting);

        loop {
            let subscribed = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.gateway.subscribe() => result,
            };

            match subscribed {
                Ok(stream) => {
                    self.set_state(ReconcilerState::Listening);
                    info!("Reconciler listening for contract events");
                    delay = self.reconnect_delay;

                    match self.listen(stream).await {
                        ListenEnd::Cancelled => break,
                        ListenEnd::Dropped(reason) => {
                            warn!("Chain subscription dropped: {}; resubscribing in {:?}", reason, delay);
                            self.set_state(ReconcilerState::Reconnecting);
                        }
                    }
                }
                Err(e) if e.is_permanent() => {
                    error!("Reconciler cannot start: {}", e);
                    break;
                }
                Err(e) => {
                    warn!("Chain subscription failed: {}; retrying in {:?}", e, delay);
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ReconcilerState::Disconnected);
        info!("Reconciler stopped");
    }

    async fn listen(&self, mut stream: EventStream) -> ListenEnd {
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return ListenEnd::Cancelled,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(event)) => self.handle_event(event).await,
                Some(Err(ChainError::Decode(e))) => warn!("Skipping undecodable contract log: {}", e),
                Some(Err(e)) => return ListenEnd::Dropped(e.to_string()),
                None => return ListenEnd::Dropped("event stream ended".into()),
            }
        }
    }

    async fn handle_event(&self, event: ChainEvent) {
        info!("Chain event {} for campaign {}", event.name(), event.campaign_id());

        let campaigns = self.campaigns.clone();
        let result = tokio::task::spawn_blocking(move || apply_event(&campaigns, event)).await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(ServiceError::NotFound(_))) => {
                warn!("Campaign not found in store, event ignored");
            }
            Ok(Err(e)) => error!("Failed to apply chain event: {}", e),
            Err(e) => error!("spawn_blocking join error: {}", e),
        }
    }

    fn set_state(&self, state: ReconcilerState) {
        debug!("Reconciler state -> {:?}", state);
        self.state.send_replace(state);
    }
}

/// Applies one decoded event to the store.
///
/// `CampaignCreated` never creates a record: campaigns enter the store
/// through the API, and the event only confirms that write.
pub fn apply_event(campaigns: &CampaignService, event: ChainEvent) -> ServiceResult<()> {
    match event {
        ChainEvent::CampaignCreated { campaign_id, .. } => {
            match campaigns.find_by_contract_id(campaign_id)? {
                Some(existing) => debug!("Campaign {} already stored as {}", campaign_id, existing.id),
                None => info!("Campaign {} not in store yet, waiting for API creation", campaign_id),
            }
            Ok(())
        }
        ChainEvent::DonationReceived {
            campaign_id,
            donator,
            amount,
            transaction_hash,
        } => {
            let outcome = campaigns.record_donation(NewDonation {
                contract_id: campaign_id,
                donator,
                amount,
                transaction_hash,
            })?;
            if outcome.is_new() {
                info!(
                    "Campaign {} updated from chain, total {}",
                    campaign_id,
                    outcome.campaign().amount_collected
                );
            }
            Ok(())
        }
    }
}

impl ReconcilerHandle {
    pub fn state(&self) -> ReconcilerState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ReconcilerState> {
        self.state.clone()
    }

    /// Cancels the subscription and waits for the task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Some(task) = self.task {
            if let Err(e) = task.await {
                error!("Reconciler task ended abnormally: {}", e);
            }
        }
    }

    /// Shuts down as soon as `token` is cancelled. The returned task
    /// finishes once the reconciler has stopped.
    pub fn shutdown_on(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            token.cancelled().await;
            info!("Stopping chain reconciler");
            self.shutdown().await;
        })
    }
}
