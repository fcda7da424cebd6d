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

//! Error taxonomy for the round lifecycle manager and per-round protocol.

use thiserror::Error;

use crate::types::{Hash, RoundId};

/// Transactions and observations that a failed round must hand back to the mempools.
///
/// Every classified error carries the exact inputs the round had pulled so far, so
/// the caller can return them without re-deriving what was in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnreturnedInputs {
    /// Content hashes of transactions to return to the pending pool.
    pub transactions: Vec<Hash>,
    /// Content hashes of observations to return to the pending pool.
    pub observations: Vec<Hash>,
}

impl UnreturnedInputs {
    /// An empty set of unreturned inputs (no mempool pulls happened yet).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(transactions: Vec<Hash>, observations: Vec<Hash>) -> Self {
        Self {
            transactions,
            observations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.observations.is_empty()
    }
}

/// Classified failures a round can end in (spec.md §7).
///
/// Every variant carries the round-id and the inputs that must be returned to the
/// mempools; `RoundManager::stop_round` is always invoked with these before the
/// error is surfaced to the caller.
#[derive(Debug, Error)]
pub enum RoundError {
    /// The node is not in a state that permits starting or joining a round.
    #[error("round {round_id}: node state does not permit this operation")]
    InvalidNodeState {
        round_id: RoundId,
        inputs: UnreturnedInputs,
    },

    /// `start_own_round` was called while an own round is already in flight.
    #[error("round {round_id}: an own round is already in progress")]
    OwnRoundAlreadyInProgress {
        round_id: RoundId,
        inputs: UnreturnedInputs,
    },

    /// `TipSelector` could not produce two eligible tips.
    #[error("round {round_id}: fewer than two tips are available for consensus")]
    NoTipsForConsensus {
        round_id: RoundId,
        inputs: UnreturnedInputs,
    },

    /// No facilitator peers remained after filtering.
    #[error("round {round_id}: no peers available to facilitate consensus")]
    NoPeersForConsensus {
        round_id: RoundId,
        inputs: UnreturnedInputs,
    },

    /// At least one facilitator failed to acknowledge the round-start notification.
    #[error("round {round_id}: not all facilitators acknowledged participation")]
    NotAllPeersParticipate {
        round_id: RoundId,
        inputs: UnreturnedInputs,
    },

    /// Parent-tip resolution left at least one hash unresolved.
    #[error("round {round_id}: parent checkpoints could not be resolved")]
    MissingParents {
        round_id: RoundId,
        inputs: UnreturnedInputs,
    },

    /// Protocol divergence: a phase mismatch, or facilitators selected different blocks.
    #[error("round {round_id}: consensus protocol diverged")]
    ConsensusError {
        round_id: RoundId,
        inputs: UnreturnedInputs,
    },

    /// The reported tip height is not above the locally accepted snapshot height.
    #[error("round {round_id}: tip height does not exceed the accepted snapshot height")]
    SnapshotHeightAboveTip {
        round_id: RoundId,
        inputs: UnreturnedInputs,
    },

    /// No transactions and no observations were pulled, and the policy exception
    /// (at least one observation or one dummy transaction) does not apply
    /// (spec.md §8).
    #[error("round {round_id}: empty payload is not permitted for this round")]
    EmptyPayload {
        round_id: RoundId,
        inputs: UnreturnedInputs,
    },
}

impl RoundError {
    /// The round-id this error pertains to.
    pub fn round_id(&self) -> RoundId {
        match self {
            Self::InvalidNodeState { round_id, .. }
            | Self::OwnRoundAlreadyInProgress { round_id, .. }
            | Self::NoTipsForConsensus { round_id, .. }
            | Self::NoPeersForConsensus { round_id, .. }
            | Self::NotAllPeersParticipate { round_id, .. }
            | Self::MissingParents { round_id, .. }
            | Self::ConsensusError { round_id, .. }
            | Self::SnapshotHeightAboveTip { round_id, .. }
            | Self::EmptyPayload { round_id, .. } => *round_id,
        }
    }

    /// The inputs this error's recovery path must return to the mempools.
    pub fn inputs(&self) -> &UnreturnedInputs {
        match self {
            Self::InvalidNodeState { inputs, .. }
            | Self::OwnRoundAlreadyInProgress { inputs, .. }
            | Self::NoTipsForConsensus { inputs, .. }
            | Self::NoPeersForConsensus { inputs, .. }
            | Self::NotAllPeersParticipate { inputs, .. }
            | Self::MissingParents { inputs, .. }
            | Self::ConsensusError { inputs, .. }
            | Self::SnapshotHeightAboveTip { inputs, .. }
            | Self::EmptyPayload { inputs, .. } => inputs,
        }
    }

    /// Whether the manager should fall back to an unconditional force-stop of the
    /// own slot rather than the ordinary classified recovery (spec.md §4.1).
    ///
    /// All variants here are themselves "classified" in the spec's sense; this
    /// distinguishes the two that surface *before* any round-id was published
    /// (no table entry exists yet to remove) from the rest.
    pub fn requires_table_cleanup(&self) -> bool {
        !matches!(
            self,
            Self::InvalidNodeState { .. } | Self::OwnRoundAlreadyInProgress { .. }
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::InvalidNodeState { .. } => "InvalidNodeState",
            Self::OwnRoundAlreadyInProgress { .. } => "OwnRoundAlreadyInProgress",
            Self::NoTipsForConsensus { .. } => "NoTipsForConsensus",
            Self::NoPeersForConsensus { .. } => "NoPeersForConsensus",
            Self::NotAllPeersParticipate { .. } => "NotAllPeersParticipate",
            Self::MissingParents { .. } => "MissingParents",
            Self::ConsensusError { .. } => "ConsensusError",
            Self::SnapshotHeightAboveTip { .. } => "SnapshotHeightAboveTip",
            Self::EmptyPayload { .. } => "EmptyPayload",
        }
    }
}
