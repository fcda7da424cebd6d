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

//! The per-round, three-phase block-selection protocol (spec.md §4.2).
//!
//! One `RoundProtocol` exists per round and is logically single-threaded: the
//! `RoundManager` owns its mailbox and feeds it messages one at a time, the way
//! the teacher's `NodeHandler::handle_consensus` serializes all consensus message
//! handling through a single `&mut self` (src/consensus.rs). There is no internal
//! locking here because there is no internal concurrency — callers are required to
//! call `handle_*`/`stop` sequentially.

use std::collections::{BTreeMap, BTreeSet};

use log::{trace, warn};

use crate::error::UnreturnedInputs;
use crate::types::{
    CheckpointBlock, FacilitatorId, Hash, Observation, RoundId, Transaction, TypedEdgeHash,
};

/// Phase 1 broadcast: a facilitator's proposed transactions and observations.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusDataProposal {
    pub round_id: RoundId,
    pub facilitator_id: FacilitatorId,
    pub transactions: Vec<Transaction>,
    pub observations: Vec<Observation>,
}

/// Phase 2 broadcast: a facilitator's signed candidate block built from the union.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionBlockProposal {
    pub round_id: RoundId,
    pub facilitator_id: FacilitatorId,
    pub signed_block: CheckpointBlock,
}

/// Phase 3 broadcast: a facilitator's choice among the phase-2 candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedUnionBlock {
    pub round_id: RoundId,
    pub facilitator_id: FacilitatorId,
    pub selected_block_hash: Hash,
}

/// The protocol's state machine positions (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    WaitingForProposals,
    WaitingForBlockUnions,
    WaitingForSelection,
    Committed,
    Failed,
}

impl RoundPhase {
    /// Ordinal used to classify an incoming message as early/current/future
    /// (SPEC_FULL.md §E.2's `PhaseOrdering`, grounded in the teacher's height/epoch
    /// comparison in `consensus.rs::handle_consensus`).
    fn ordinal(self) -> u8 {
        match self {
            Self::WaitingForProposals => 0,
            Self::WaitingForBlockUnions => 1,
            Self::WaitingForSelection => 2,
            Self::Committed | Self::Failed => 3,
        }
    }
}

/// Classification of an incoming message relative to the protocol's current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOrdering {
    /// Addressed to an earlier phase than the current one: discard.
    Stale,
    /// Addressed to the current phase: handle now.
    Current,
    /// Addressed to a future phase: buffer until the protocol catches up.
    Future,
}

fn classify(current: RoundPhase, message_phase: RoundPhase) -> PhaseOrdering {
    match message_phase.ordinal().cmp(&current.ordinal()) {
        std::cmp::Ordering::Less => PhaseOrdering::Stale,
        std::cmp::Ordering::Equal => PhaseOrdering::Current,
        std::cmp::Ordering::Greater => PhaseOrdering::Future,
    }
}

#[derive(Debug)]
enum Buffered {
    Data(ConsensusDataProposal),
    Union(UnionBlockProposal),
    Selection(SelectedUnionBlock),
}

/// Result of feeding one message into a phase handler.
///
/// Distinguishes an ordinary "still accumulating" message from one addressed to
/// a phase the protocol has already left behind, so callers can meter the latter
/// (spec.md §8: "proposal arriving after `Committed` state: discarded, metric
/// incremented") without mistaking it for routine pending traffic.
#[derive(Debug)]
pub enum Advance<T> {
    /// Accepted; the phase hasn't completed (or the message was buffered for a
    /// future phase).
    Pending,
    /// The phase completed; here is its output.
    Ready(T),
    /// Addressed to a phase already left behind: discarded.
    Stale,
}


/// Per-round protocol state machine.
#[derive(Debug)]
pub struct RoundProtocol {
    round_id: RoundId,
    facilitators: BTreeSet<FacilitatorId>,
    own_id: FacilitatorId,
    parent_tips: [TypedEdgeHash; 2],
    phase: RoundPhase,

    data_proposals: BTreeMap<FacilitatorId, ConsensusDataProposal>,
    union_proposals: BTreeMap<FacilitatorId, UnionBlockProposal>,
    selections: BTreeMap<FacilitatorId, SelectedUnionBlock>,

    /// This facilitator's own pulled inputs, tracked separately from the union so
    /// cancellation can return exactly what this node contributed (spec.md §4.2
    /// "Cancellation").
    own_inputs: UnreturnedInputs,

    /// Messages addressed to a phase the protocol hasn't reached yet.
    future_inbox: Vec<Buffered>,
}

impl RoundProtocol {
    pub fn new(
        round_id: RoundId,
        facilitators: BTreeSet<FacilitatorId>,
        own_id: FacilitatorId,
        parent_tips: [TypedEdgeHash; 2],
    ) -> Self {
        Self {
            round_id,
            facilitators,
            own_id,
            parent_tips,
            phase: RoundPhase::WaitingForProposals,
            data_proposals: BTreeMap::new(),
            union_proposals: BTreeMap::new(),
            selections: BTreeMap::new(),
            own_inputs: UnreturnedInputs::empty(),
            future_inbox: Vec::new(),
        }
    }

    pub fn round_id(&self) -> RoundId {
        self.round_id
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, RoundPhase::Committed | RoundPhase::Failed)
    }

    pub fn facilitators(&self) -> &BTreeSet<FacilitatorId> {
        &self.facilitators
    }

    /// Submits this facilitator's own proposal, entering phase 1's bookkeeping.
    /// Tracks `transactions`/`observations` as the inputs to return on cancellation.
    pub fn submit_own_proposal(&mut self, transactions: Vec<Transaction>, observations: Vec<Observation>) -> ConsensusDataProposal {
        self.own_inputs = UnreturnedInputs::new(
            transactions.iter().map(|t| t.content_hash.clone()).collect(),
            observations.iter().map(|o| o.content_hash.clone()).collect(),
        );
        let proposal = ConsensusDataProposal {
            round_id: self.round_id,
            facilitator_id: self.own_id.clone(),
            transactions,
            observations,
        };
        self.handle_data_proposal(proposal.clone());
        proposal
    }

    /// Handles an incoming `ConsensusDataProposal`. Returns the computed union once
    /// every facilitator has been heard from (Phase 1 → Phase 2 transition).
    pub fn handle_data_proposal(&mut self, proposal: ConsensusDataProposal) -> Advance<(Vec<Transaction>, Vec<Observation>)> {
        match classify(self.phase, RoundPhase::WaitingForProposals) {
            PhaseOrdering::Stale => {
                trace!("round {}: discarding stale data proposal from {}", self.round_id, proposal.facilitator_id);
                return Advance::Stale;
            }
            PhaseOrdering::Future => {
                self.future_inbox.push(Buffered::Data(proposal));
                return Advance::Pending;
            }
            PhaseOrdering::Current => {}
        }

        self.data_proposals.insert(proposal.facilitator_id.clone(), proposal);
        if !self.has_all(&self.data_proposals) {
            return Advance::Pending;
        }

        let union = self.compute_union();
        self.phase = RoundPhase::WaitingForBlockUnions;
        self.drain_future_inbox();
        Advance::Ready(union)
    }

    /// Deterministic union: de-duplicated by content-hash, sorted ascending
    /// (spec.md §4.2 Phase 1).
    fn compute_union(&self) -> (Vec<Transaction>, Vec<Observation>) {
        let mut tx_by_hash: BTreeMap<Hash, Transaction> = BTreeMap::new();
        let mut obs_by_hash: BTreeMap<Hash, Observation> = BTreeMap::new();
        for proposal in self.data_proposals.values() {
            for tx in &proposal.transactions {
                tx_by_hash.entry(tx.content_hash.clone()).or_insert_with(|| tx.clone());
            }
            for obs in &proposal.observations {
                obs_by_hash.entry(obs.content_hash.clone()).or_insert_with(|| obs.clone());
            }
        }
        (tx_by_hash.into_values().collect(), obs_by_hash.into_values().collect())
    }

    /// Builds this facilitator's candidate block from the union and signs its
    /// `base_hash`. Callers broadcast the returned `UnionBlockProposal`.
    pub fn build_union_block(
        &mut self,
        transactions: Vec<Transaction>,
        observations: Vec<Observation>,
        sign: impl FnOnce(&Hash) -> String,
    ) -> UnionBlockProposal {
        let mut block = CheckpointBlock::new(transactions, observations, self.parent_tips.clone());
        let signature = sign(&block.base_hash);
        block.signatures.insert(signature);
        let proposal = UnionBlockProposal {
            round_id: self.round_id,
            facilitator_id: self.own_id.clone(),
            signed_block: block,
        };
        self.handle_union_block(proposal.clone());
        proposal
    }

    /// Handles an incoming `UnionBlockProposal`. Once every facilitator's candidate
    /// has arrived, deterministically selects the lexicographically smallest
    /// `base_hash` (ties broken by ascending facilitator id) and returns the
    /// `SelectedUnionBlock` this facilitator should broadcast (Phase 2 → Phase 3).
    pub fn handle_union_block(&mut self, proposal: UnionBlockProposal) -> Advance<SelectedUnionBlock> {
        match classify(self.phase, RoundPhase::WaitingForBlockUnions) {
            PhaseOrdering::Stale => {
                trace!("round {}: discarding stale union block from {}", self.round_id, proposal.facilitator_id);
                return Advance::Stale;
            }
            PhaseOrdering::Future => {
                self.future_inbox.push(Buffered::Union(proposal));
                return Advance::Pending;
            }
            PhaseOrdering::Current => {}
        }

        self.union_proposals.insert(proposal.facilitator_id.clone(), proposal);
        if !self.has_all(&self.union_proposals) {
            return Advance::Pending;
        }

        let winner = self
            .union_proposals
            .values()
            .min_by(|a, b| {
                a.signed_block
                    .base_hash
                    .cmp(&b.signed_block.base_hash)
                    .then_with(|| a.facilitator_id.cmp(&b.facilitator_id))
            })
            .expect("has_all guarantees at least one entry");

        let selection = SelectedUnionBlock {
            round_id: self.round_id,
            facilitator_id: self.own_id.clone(),
            selected_block_hash: winner.signed_block.base_hash.clone(),
        };
        self.phase = RoundPhase::WaitingForSelection;
        self.handle_selection(selection.clone());
        self.drain_future_inbox();
        Advance::Ready(selection)
    }

    /// Handles an incoming `SelectedUnionBlock`. Once every facilitator's choice has
    /// arrived, the round succeeds iff they all agree; otherwise it fails with
    /// `ConsensusError` (spec.md §4.2 Phase 3).
    pub fn handle_selection(&mut self, selection: SelectedUnionBlock) -> Advance<Result<CheckpointBlock, ()>> {
        match classify(self.phase, RoundPhase::WaitingForSelection) {
            PhaseOrdering::Stale => {
                trace!("round {}: discarding stale selection from {}", self.round_id, selection.facilitator_id);
                return Advance::Stale;
            }
            PhaseOrdering::Future => {
                self.future_inbox.push(Buffered::Selection(selection));
                return Advance::Pending;
            }
            PhaseOrdering::Current => {}
        }

        self.selections.insert(selection.facilitator_id.clone(), selection);
        if !self.has_all(&self.selections) {
            return Advance::Pending;
        }

        let mut hashes: BTreeSet<&Hash> = BTreeSet::new();
        for sel in self.selections.values() {
            hashes.insert(&sel.selected_block_hash);
        }

        if hashes.len() != 1 {
            warn!(
                "round {}: facilitators diverged on selection ({} distinct hashes)",
                self.round_id,
                hashes.len()
            );
            self.phase = RoundPhase::Failed;
            return Advance::Ready(Err(()));
        }

        let agreed_hash = (*hashes.iter().next().unwrap()).clone();
        let mut block = self
            .union_proposals
            .values()
            .find(|p| p.signed_block.base_hash == agreed_hash)
            .expect("agreed hash must come from a seen union proposal")
            .signed_block
            .clone();

        for union in self.union_proposals.values() {
            if union.signed_block.base_hash == agreed_hash {
                block.signatures.extend(union.signed_block.signatures.iter().cloned());
            }
        }
        block.seal_soe();

        self.phase = RoundPhase::Committed;
        Advance::Ready(Ok(block))
    }

    /// Transitions to `Failed` and returns this facilitator's own inputs for
    /// release back to the mempools (spec.md §4.2 "Cancellation").
    pub fn stop(&mut self) -> UnreturnedInputs {
        self.phase = RoundPhase::Failed;
        std::mem::take(&mut self.own_inputs)
    }

    fn has_all<V>(&self, map: &BTreeMap<FacilitatorId, V>) -> bool {
        self.facilitators.iter().all(|f| map.contains_key(f))
    }

    /// Replays any messages buffered for a phase the protocol just reached.
    /// Bounded by `future_inbox.len()` per phase transition: each buffered message
    /// is addressed to a specific later phase and is simply stale (discarded) if it
    /// was for a phase further out than the one just reached.
    fn drain_future_inbox(&mut self) {
        let buffered = std::mem::take(&mut self.future_inbox);
        for item in buffered {
            match item {
                Buffered::Data(p) => {
                    self.handle_data_proposal(p);
                }
                Buffered::Union(p) => {
                    self.handle_union_block(p);
                }
                Buffered::Selection(p) => {
                    self.handle_selection(p);
                }
            }
        }
    }
}
