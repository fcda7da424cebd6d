// Copyright 2026 The Constellation Network Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The round lifecycle manager (spec.md §4.1).
//!
//! Mirrors the teacher's split between `State` (bookkeeping under a lock,
//! `state.rs`) and `NodeHandler` (the orchestration that suspends on external
//! calls, `consensus.rs`): the round tables and proposal buffer here are the
//! bookkeeping, `RoundManager`'s methods are the orchestration. The lock
//! (`install_lock`) is only ever held across in-memory table mutation, never
//! across an `.await` on an external collaborator — per spec.md §5.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, trace, warn};
use mini_moka::sync::Cache;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::Configuration;
use crate::error::{RoundError, UnreturnedInputs};
use crate::external::{
    can_participate_consensus, can_start_own_consensus, CheckpointResolutionQueue,
    CheckpointStore, ClusterStorage, NodeStorage, ObservationService, RemoteSender, Signer,
    TransactionService,
};
use crate::metrics::MetricsSink;
use crate::round_protocol::{
    Advance, ConsensusDataProposal, RoundProtocol, SelectedUnionBlock, UnionBlockProposal,
};
use crate::tip_selector::TipSelector;
use crate::types::{
    CheckpointBlock, ConsensusInfo, FacilitatorId, Hash, OwnConsensus, PeerId, ProtocolHandle,
    RoundData, RoundId, TipsSoe,
};

/// A message addressed to a round, buffered until the round is installed locally
/// (spec.md §4.1's `proposals` cache).
#[derive(Debug, Clone)]
pub enum IncomingProposal {
    Data(ConsensusDataProposal),
    Union(UnionBlockProposal),
    Selection(SelectedUnionBlock),
}

/// What happened after a message was fed into a round's protocol.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The protocol consumed the message but hasn't transitioned phases.
    Pending,
    /// Phase 1 completed; here is the union this facilitator should build and
    /// broadcast a `UnionBlockProposal` from.
    UnionReady,
    /// Phase 2 completed; this facilitator's `SelectedUnionBlock` was broadcast.
    SelectionBroadcast,
    /// Phase 3 completed and all facilitators agreed: the block was committed.
    Committed(CheckpointBlock),
    /// Phase 3 completed but facilitators diverged: the round failed.
    Diverged,
    /// No round with this id is installed locally; the message was buffered.
    Buffered,
    /// The message was addressed to a phase the round already left behind (e.g.
    /// it arrived after the round committed) and was discarded (spec.md §8).
    Discarded,
}

/// Tracks active rounds and enforces the lifecycle invariants from spec.md §4.1.
pub struct RoundManager {
    own_peer_id: FacilitatorId,
    config: Configuration,

    consensuses: AsyncMutex<HashMap<RoundId, ConsensusInfo>>,
    own_consensus: AsyncMutex<Option<OwnConsensus>>,
    /// Guards the in-memory "start own round" and "buffer missed proposal"
    /// critical sections (spec.md §4.1's `semaphore`).
    install_lock: AsyncMutex<()>,
    proposals: Cache<RoundId, Arc<std::sync::Mutex<Vec<IncomingProposal>>>>,

    tip_selector: Arc<dyn TipSelector>,
    transactions: Arc<dyn TransactionService>,
    observations: Arc<dyn ObservationService>,
    cluster: Arc<dyn ClusterStorage>,
    node_storage: Arc<dyn NodeStorage>,
    sender: Arc<dyn RemoteSender>,
    resolution_queue: Arc<dyn CheckpointResolutionQueue>,
    checkpoint_store: Arc<dyn CheckpointStore>,
    signer: Arc<dyn Signer>,
    metrics: Arc<dyn MetricsSink>,
}

impl RoundManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        own_peer_id: FacilitatorId,
        config: Configuration,
        tip_selector: Arc<dyn TipSelector>,
        transactions: Arc<dyn TransactionService>,
        observations: Arc<dyn ObservationService>,
        cluster: Arc<dyn ClusterStorage>,
        node_storage: Arc<dyn NodeStorage>,
        sender: Arc<dyn RemoteSender>,
        resolution_queue: Arc<dyn CheckpointResolutionQueue>,
        checkpoint_store: Arc<dyn CheckpointStore>,
        signer: Arc<dyn Signer>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let proposals = Cache::builder()
            .time_to_live(config.proposal_cache_ttl())
            .build();
        Self {
            own_peer_id,
            config,
            consensuses: AsyncMutex::new(HashMap::new()),
            own_consensus: AsyncMutex::new(None),
            install_lock: AsyncMutex::new(()),
            proposals,
            tip_selector,
            transactions,
            observations,
            cluster,
            node_storage,
            sender,
            resolution_queue,
            checkpoint_store,
            signer,
            metrics,
        }
    }

    /// Starts a round this node initiates (spec.md §4.1 `startOwnRound`).
    pub async fn start_own_round(&self) -> Result<ConsensusInfo, RoundError> {
        let state = self.node_storage.get_node_state().await;
        if !can_start_own_consensus(state) {
            return Err(RoundError::InvalidNodeState {
                round_id: RoundId::generate(),
                inputs: UnreturnedInputs::empty(),
            });
        }

        // Fast in-memory section: allocate the round-id and publish a stub slot.
        // No suspension point is reached while `_guard` is held (spec.md §5).
        let round_id = {
            let _guard = self.install_lock.lock().await;
            let mut own = self.own_consensus.lock().await;
            if let Some(existing) = &*own {
                return Err(RoundError::OwnRoundAlreadyInProgress {
                    round_id: existing.round_id,
                    inputs: UnreturnedInputs::empty(),
                });
            }
            let round_id = RoundId::generate();
            *own = Some(OwnConsensus { round_id, info: None });
            round_id
        };

        match self.assemble_own_round(round_id).await {
            Ok(info) => {
                let mut own = self.own_consensus.lock().await;
                *own = Some(OwnConsensus {
                    round_id,
                    info: Some(info.clone()),
                });
                self.metrics.round_started();
                info!("round {round_id}: started as initiator");
                Ok(info)
            }
            Err(err) => {
                self.metrics.error(err.kind_name());
                if err.requires_table_cleanup() {
                    self.stop_round(round_id, &err.inputs().transactions, &err.inputs().observations)
                        .await;
                } else {
                    // Unclassified failure before any inputs were consumed: force-clear
                    // the own slot unconditionally and re-raise.
                    *self.own_consensus.lock().await = None;
                }
                Err(err)
            }
        }
    }

    /// Everything after the stub publish: building `RoundData`, resolving parents,
    /// instantiating the protocol, and notifying facilitators. Every step here is a
    /// suspension point, so none of it runs under `install_lock`.
    async fn assemble_own_round(&self, round_id: RoundId) -> Result<ConsensusInfo, RoundError> {
        let (tips_soe, mut facilitators) = self
            .tip_selector
            .pull_tips(&self.own_peer_id)
            .await
            .ok_or_else(|| RoundError::NoTipsForConsensus {
                round_id,
                inputs: UnreturnedInputs::empty(),
            })?;
        facilitators.insert(self.own_peer_id.clone());

        if facilitators.len() < 2 {
            return Err(RoundError::NoPeersForConsensus {
                round_id,
                inputs: UnreturnedInputs::empty(),
            });
        }

        if let Some(snapshot_height) = self.tip_selector.accepted_snapshot_height() {
            if !crate::tip_selector::check_snapshot_height(&tips_soe, snapshot_height) {
                return Err(RoundError::SnapshotHeightAboveTip {
                    round_id,
                    inputs: UnreturnedInputs::empty(),
                });
            }
        }

        self.resolve_parents(&tips_soe, None).await.map_err(|err| {
            trace!("round {round_id}: {err}");
            RoundError::MissingParents {
                round_id,
                inputs: UnreturnedInputs::empty(),
            }
        })?;

        let transactions = self
            .transactions
            .pull_for_consensus(self.config.max_transaction_threshold)
            .await;
        let observations = self
            .observations
            .pull_for_consensus(self.config.max_observation_threshold)
            .await;

        if transactions.is_empty() && observations.is_empty() {
            return Err(RoundError::EmptyPayload {
                round_id,
                inputs: UnreturnedInputs::empty(),
            });
        }

        let inputs = UnreturnedInputs::new(
            transactions.iter().map(|t| t.content_hash.clone()).collect(),
            observations.iter().map(|o| o.content_hash.clone()).collect(),
        );

        let mut protocol = RoundProtocol::new(
            round_id,
            facilitators.clone(),
            self.own_peer_id.clone(),
            tips_soe.soe.clone(),
        );
        let own_proposal = protocol.submit_own_proposal(transactions.clone(), observations.clone());

        let round_data = RoundData {
            round_id,
            facilitators: facilitators.clone(),
            own_facilitator_id: self.own_peer_id.clone(),
            selected_transactions: transactions,
            selected_observations: observations,
            tips_soe: tips_soe.clone(),
            arrived_peers: Default::default(),
        };

        let acks = self.sender.notify_facilitators(&round_data).await;
        if acks.iter().any(|ack| !ack) {
            return Err(RoundError::NotAllPeersParticipate {
                round_id,
                inputs,
            });
        }

        let peers_to_notify: Vec<PeerId> = facilitators
            .iter()
            .filter(|f| **f != self.own_peer_id)
            .cloned()
            .collect();
        self.sender
            .broadcast_data_proposal(&peers_to_notify, own_proposal)
            .await;

        let info = ConsensusInfo {
            round_id,
            protocol: Arc::new(AsyncMutex::new(protocol)),
            tip_min_height: tips_soe.min_height,
            start_time: Instant::now(),
        };
        self.consensuses.lock().await.insert(round_id, info.clone());
        Ok(info)
    }

    /// Joins a round initiated by `initiator` (spec.md §4.1 `participateInRound`).
    ///
    /// The node state is read exactly once (spec.md §9's open question: the
    /// source reads it twice for no documented reason, so this crate reads it once).
    pub async fn participate_in_round(
        &self,
        mut round_data: RoundData,
        initiator: FacilitatorId,
    ) -> Result<(ConsensusInfo, RoundData), RoundError> {
        let state = self.node_storage.get_node_state().await;
        if !can_participate_consensus(state) {
            return Err(RoundError::InvalidNodeState {
                round_id: round_data.round_id,
                inputs: UnreturnedInputs::empty(),
            });
        }

        let resolution_hint = initiator.clone();
        round_data.facilitators.insert(self.own_peer_id.clone());
        if !round_data.facilitators.contains(&initiator) {
            if self.cluster.get_peer(&initiator).await.is_none() {
                return Err(RoundError::ConsensusError {
                    round_id: round_data.round_id,
                    inputs: UnreturnedInputs::empty(),
                });
            }
            round_data.facilitators.insert(initiator);
        }

        let round_id = round_data.round_id;

        if round_data.selected_transactions.is_empty() && round_data.selected_observations.is_empty() {
            return Err(RoundError::EmptyPayload {
                round_id,
                inputs: UnreturnedInputs::empty(),
            });
        }

        self.resolve_parents(&round_data.tips_soe, Some(resolution_hint))
            .await
            .map_err(|err| {
                trace!("round {round_id}: {err}");
                RoundError::MissingParents {
                    round_id,
                    inputs: UnreturnedInputs::empty(),
                }
            })?;

        let mut protocol = RoundProtocol::new(
            round_data.round_id,
            round_data.facilitators.clone(),
            self.own_peer_id.clone(),
            round_data.tips_soe.soe.clone(),
        );
        protocol.submit_own_proposal(
            round_data.selected_transactions.clone(),
            round_data.selected_observations.clone(),
        );
        let info = ConsensusInfo {
            round_id: round_data.round_id,
            protocol: Arc::new(AsyncMutex::new(protocol)),
            tip_min_height: round_data.tips_soe.min_height,
            start_time: Instant::now(),
        };

        // Install and drain any missed proposals atomically under the same lock
        // `add_missed_proposal` appends under (spec.md §5 ordering guarantee).
        let buffered = {
            let _guard = self.install_lock.lock().await;
            self.consensuses
                .lock()
                .await
                .insert(round_data.round_id, info.clone());
            let buffered = self.proposals.get(&round_data.round_id);
            self.proposals.invalidate(&round_data.round_id);
            buffered
        };

        if let Some(buffer) = buffered {
            let messages = std::mem::take(&mut *buffer.lock().unwrap());
            for message in messages {
                self.dispatch_to(round_data.round_id, message).await;
            }
        }

        Ok((info, round_data))
    }

    /// Buffers a proposal for a round that has not been installed locally yet
    /// (spec.md §4.1 `addMissedProposal`). If the round is already installed by
    /// the time this is called, dispatches immediately instead of buffering.
    pub async fn add_missed_proposal(&self, round_id: RoundId, proposal: IncomingProposal) {
        let _guard = self.install_lock.lock().await;
        if self.is_installed(round_id).await {
            drop(_guard);
            Box::pin(self.dispatch_to(round_id, proposal)).await;
            return;
        }
        let buffer = match self.proposals.get(&round_id) {
            Some(buffer) => buffer,
            None => {
                let buffer = Arc::new(std::sync::Mutex::new(Vec::new()));
                self.proposals.insert(round_id, buffer.clone());
                buffer
            }
        };
        buffer.lock().unwrap().push(proposal);
    }

    async fn is_installed(&self, round_id: RoundId) -> bool {
        if self.consensuses.lock().await.contains_key(&round_id) {
            return true;
        }
        matches!(&*self.own_consensus.lock().await, Some(own) if own.round_id == round_id)
    }

    async fn protocol_handle(&self, round_id: RoundId) -> Option<ProtocolHandle> {
        if let Some(info) = self.consensuses.lock().await.get(&round_id) {
            return Some(info.protocol.clone());
        }
        if let Some(own) = &*self.own_consensus.lock().await {
            if own.round_id == round_id {
                return own.info.as_ref().map(|i| i.protocol.clone());
            }
        }
        None
    }

    /// Feeds one message into an installed round's protocol, broadcasting or
    /// finalizing as the state machine transitions (spec.md §4.2).
    pub async fn dispatch_to(&self, round_id: RoundId, proposal: IncomingProposal) -> DispatchOutcome {
        let Some(handle) = self.protocol_handle(round_id).await else {
            self.add_missed_proposal(round_id, proposal).await;
            return DispatchOutcome::Buffered;
        };
        let mut protocol = handle.lock().await;

        match proposal {
            IncomingProposal::Data(p) => match protocol.handle_data_proposal(p) {
                Advance::Pending => DispatchOutcome::Pending,
                Advance::Ready(_union) => DispatchOutcome::UnionReady,
                Advance::Stale => {
                    drop(protocol);
                    self.metrics.proposal_discarded();
                    DispatchOutcome::Discarded
                }
            },
            IncomingProposal::Union(p) => match protocol.handle_union_block(p) {
                Advance::Pending => DispatchOutcome::Pending,
                Advance::Ready(selection) => {
                    let peers = self.other_facilitators(&protocol);
                    drop(protocol);
                    self.sender.broadcast_selected_block(&peers, selection).await;
                    DispatchOutcome::SelectionBroadcast
                }
                Advance::Stale => {
                    drop(protocol);
                    self.metrics.proposal_discarded();
                    DispatchOutcome::Discarded
                }
            },
            IncomingProposal::Selection(p) => match protocol.handle_selection(p) {
                Advance::Pending => DispatchOutcome::Pending,
                Advance::Ready(Ok(block)) => {
                    drop(protocol);
                    self.checkpoint_store.store_soe(&block).await;
                    self.checkpoint_store.add_to_acceptance(&block).await;
                    self.metrics.round_committed();
                    trace!("round {round_id}: committed block {}", block.base_hash);
                    self.remove_from_tables(round_id).await;
                    self.proposals.invalidate(&round_id);
                    DispatchOutcome::Committed(block)
                }
                Advance::Ready(Err(())) => {
                    drop(protocol);
                    self.stop_round(round_id, &[], &[]).await;
                    self.metrics.error(RoundError::ConsensusError {
                        round_id,
                        inputs: UnreturnedInputs::empty(),
                    }.kind_name());
                    DispatchOutcome::Diverged
                }
                Advance::Stale => {
                    drop(protocol);
                    self.metrics.proposal_discarded();
                    DispatchOutcome::Discarded
                }
            },
        }
    }

    fn other_facilitators(&self, protocol: &RoundProtocol) -> Vec<PeerId> {
        protocol
            .facilitators()
            .iter()
            .filter(|f| **f != self.own_peer_id)
            .cloned()
            .collect()
    }

    /// Signs and broadcasts this facilitator's `UnionBlockProposal` once phase 1's
    /// union is ready. Exposed separately from `dispatch_to` because building the
    /// candidate block requires the caller's chosen transaction/observation set
    /// (ordinarily just the computed union, but customizable per SPEC_FULL.md §E.2).
    pub async fn build_and_broadcast_union(
        &self,
        round_id: RoundId,
        transactions: Vec<crate::types::Transaction>,
        observations: Vec<crate::types::Observation>,
    ) {
        let Some(handle) = self.protocol_handle(round_id).await else {
            return;
        };
        let mut protocol = handle.lock().await;
        let signer = self.signer.clone();
        let proposal = protocol.build_union_block(transactions, observations, |hash| signer.sign(hash));
        let peers = self.other_facilitators(&protocol);
        drop(protocol);
        self.sender.broadcast_union_block(&peers, proposal).await;
    }

    /// Removes `round_id` from both tables and returns its inputs to the mempools
    /// (spec.md §4.1 `stopRound`). Idempotent.
    pub async fn stop_round(&self, round_id: RoundId, transactions: &[Hash], observations: &[Hash]) {
        self.remove_from_tables(round_id).await;
        self.proposals.invalidate(&round_id);

        if !transactions.is_empty() {
            self.transactions.return_to_pending(transactions).await;
            self.transactions.clear_in_consensus(transactions).await;
        }
        if !observations.is_empty() {
            self.observations.return_to_pending(observations).await;
            self.observations.clear_in_consensus(observations).await;
        }
        self.metrics.round_stopped();
        info!("round {round_id}: stopped");
    }

    async fn remove_from_tables(&self, round_id: RoundId) {
        self.consensuses.lock().await.remove(&round_id);
        let mut own = self.own_consensus.lock().await;
        if matches!(&*own, Some(o) if o.round_id == round_id) {
            *own = None;
        }
    }

    /// Evicts every round whose age exceeds the configured timeout (spec.md §4.1
    /// `cleanLongRunning`). Returns the number of rounds evicted.
    pub async fn clean_long_running(&self) -> usize {
        let timeout = self.config.form_checkpoint_blocks_timeout;
        let mut expired = Vec::new();

        for (round_id, info) in self.consensuses.lock().await.iter() {
            if info.start_time.elapsed() > timeout {
                expired.push((*round_id, info.protocol.clone()));
            }
        }
        if let Some(own) = &*self.own_consensus.lock().await {
            if let Some(info) = &own.info {
                if info.start_time.elapsed() > timeout {
                    expired.push((own.round_id, info.protocol.clone()));
                }
            }
        }

        let count = expired.len();
        for (round_id, protocol) in expired {
            let returned = protocol.lock().await.stop();
            self.stop_round(round_id, &returned.transactions, &returned.observations)
                .await;
            self.metrics.round_timed_out();
            warn!("round {round_id}: evicted by cleanLongRunning");
        }
        count
    }

    /// Stops every active round after a fixed grace period (spec.md §4.1
    /// `terminateAll`), used during shutdown.
    pub async fn terminate_all(&self) {
        tokio::time::sleep(Duration::from_secs(5)).await;

        let mut round_ids: Vec<(RoundId, ProtocolHandle)> = self
            .consensuses
            .lock()
            .await
            .iter()
            .map(|(id, info)| (*id, info.protocol.clone()))
            .collect();
        if let Some(own) = &*self.own_consensus.lock().await {
            if let Some(info) = &own.info {
                round_ids.push((own.round_id, info.protocol.clone()));
            }
        }

        for (round_id, protocol) in round_ids {
            let returned = protocol.lock().await.stop();
            self.stop_round(round_id, &returned.transactions, &returned.observations)
                .await;
        }
    }

    /// Parent resolution (spec.md §4.1.1). Returns `Ok(())` only when both tip
    /// hashes are already accepted; otherwise enqueues whatever forward-progress
    /// work is needed (acceptance for locally-known blocks, resolution for
    /// genuinely missing ones) and returns an unclassified error so the caller
    /// raises `MissingParents` — the round can be retried once resolution
    /// completes. Uses `anyhow::Result` rather than `RoundError` directly: this is
    /// an internal helper with no round-id of its own to attach, classified only
    /// at the `RoundManager` call site (spec.md §E.1.1).
    async fn resolve_parents(&self, tips_soe: &TipsSoe, hint_peer: Option<PeerId>) -> anyhow::Result<()> {
        let mut all_accepted = true;
        for edge in &tips_soe.soe {
            let hash = &edge.referenced_hash;
            if hash.as_str() == "coinbase" || self.checkpoint_store.is_checkpoint_accepted(hash).await {
                continue;
            }
            all_accepted = false;

            if let Some(block) = self.checkpoint_store.get_checkpoint(hash).await {
                self.checkpoint_store.add_to_acceptance(&block).await;
                continue;
            }

            let already_in_progress = self.checkpoint_store.is_waiting_for_resolving(hash).await
                || self.checkpoint_store.is_checkpoint_in_acceptance(hash).await
                || self.checkpoint_store.is_checkpoint_waiting_for_acceptance(hash).await
                || self.checkpoint_store.is_checkpoint_awaiting(hash).await;
            if !already_in_progress {
                self.resolution_queue
                    .enqueue_checkpoint(hash.clone(), hint_peer.clone())
                    .await;
            }
        }

        if all_accepted {
            Ok(())
        } else {
            anyhow::bail!("not all parent checkpoints are accepted yet")
        }
    }
}
