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

//! A round lifecycle manager and per-round block-selection protocol for a
//! checkpoint-block DAG consensus core.
//!
//! A round is a short-lived, three-phase agreement among a subset of cluster
//! peers (the round's facilitators) on the next checkpoint block to append to
//! the DAG: each facilitator proposes transactions and observations, the
//! proposals are unioned deterministically, and the facilitators vote on which
//! resulting candidate block to commit.
//!
//! [`round_manager::RoundManager`] owns the lifecycle — starting a round this
//! node initiates, joining one a peer initiated, buffering messages that
//! arrive before a round is installed, and evicting rounds that run long.
//! [`round_protocol::RoundProtocol`] is the per-round state machine it drives.
//! [`tip_selector`] picks the two parent tips a new round builds on.
//! [`genesis`] builds the bootstrap blocks a fresh DAG starts from.
//!
//! Storage, the wire transport, the mempools, and cluster membership are
//! consumed through the narrow traits in [`external`]; this crate does not
//! implement any of them.

mod config;
mod error;
mod external;
mod genesis;
mod metrics;
mod round_manager;
mod round_protocol;
#[cfg(test)]
mod tests_support;
mod tip_selector;
mod tx_chain;
mod types;

pub use config::Configuration;
pub use error::{RoundError, UnreturnedInputs};
pub use external::{
    can_participate_consensus, can_start_own_consensus, CheckpointResolutionQueue,
    CheckpointStore, ClusterStorage, NodeState, NodeStorage, ObservationService, PeerData,
    RemoteSender, Signer, TransactionService,
};
pub use genesis::{GenesisBuilder, GenesisOutput};
pub use metrics::{CountingMetrics, MetricsSink, NoopMetrics};
pub use round_manager::{DispatchOutcome, IncomingProposal, RoundManager};
pub use round_protocol::{
    ConsensusDataProposal, PhaseOrdering, RoundPhase, RoundProtocol, SelectedUnionBlock,
    UnionBlockProposal,
};
pub use tip_selector::{check_snapshot_height, AcceptAll, StandardTipSelector, TipCandidate, TipFilter, TipSelector};
pub use tx_chain::TxChain;
pub use types::{
    Address, CheckpointBlock, ConsensusInfo, EdgeType, FacilitatorId, Hash, Height,
    LastTransactionRef, Observation, OwnConsensus, PeerId, ProtocolHandle, RoundData, RoundId,
    Transaction, TypedEdgeHash, TipsSoe,
};
