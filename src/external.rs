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

//! External collaborators (spec.md §6).
//!
//! Everything in this module is a narrow trait describing a service this crate
//! consumes. The wire transport, storage engine, mempools, and cluster-membership
//! service are out of scope (spec.md §1); production embedders supply real
//! implementations, tests supply in-memory fakes (see `tests_support.rs` and
//! `tests/common/mod.rs`).

use async_trait::async_trait;

use crate::types::{CheckpointBlock, Hash, Observation, PeerId, RoundData, Transaction};

/// Node lifecycle states relevant to consensus eligibility (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Leaving,
    Offline,
    PendingDownload,
    DownloadInProgress,
    Ready,
    WaitingForDownload,
}

/// Returns whether `state` permits this node to start its own round.
pub fn can_start_own_consensus(state: NodeState) -> bool {
    matches!(state, NodeState::Ready)
}

/// Returns whether `state` permits this node to participate in a round it did not
/// initiate.
pub fn can_participate_consensus(state: NodeState) -> bool {
    matches!(state, NodeState::Ready | NodeState::WaitingForDownload)
}

/// Minimal peer metadata as tracked by cluster membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerData {
    pub id: PeerId,
    pub ready: bool,
    pub full: bool,
}

/// Consumed: local view of checkpoint-block acceptance state (spec.md §6).
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn store_soe(&self, block: &CheckpointBlock);
    async fn store(&self, block: &CheckpointBlock);
    async fn add_to_acceptance(&self, block: &CheckpointBlock);
    async fn is_checkpoint_accepted(&self, hash: &Hash) -> bool;
    async fn get_checkpoint(&self, hash: &Hash) -> Option<CheckpointBlock>;
    async fn is_waiting_for_resolving(&self, hash: &Hash) -> bool;
    async fn is_checkpoint_in_acceptance(&self, hash: &Hash) -> bool;
    async fn is_checkpoint_waiting_for_acceptance(&self, hash: &Hash) -> bool;
    async fn is_checkpoint_awaiting(&self, hash: &Hash) -> bool;
}

/// Consumed: the pending pool of transactions (spec.md §6).
#[async_trait]
pub trait TransactionService: Send + Sync {
    async fn pull_for_consensus(&self, max_n: u32) -> Vec<Transaction>;
    async fn return_to_pending(&self, hashes: &[Hash]);
    async fn clear_in_consensus(&self, hashes: &[Hash]);
    async fn accept(&self, tx: Transaction);
}

/// Consumed: the pending pool of observations (spec.md §6).
#[async_trait]
pub trait ObservationService: Send + Sync {
    async fn pull_for_consensus(&self, max_n: u32) -> Vec<Observation>;
    async fn return_to_pending(&self, hashes: &[Hash]);
    async fn clear_in_consensus(&self, hashes: &[Hash]);
    async fn accept(&self, observation: Observation);
}

/// Consumed: cluster membership (spec.md §6).
#[async_trait]
pub trait ClusterStorage: Send + Sync {
    async fn get_peers(&self) -> Vec<PeerData>;
    async fn get_ready_and_full_peers(&self) -> Vec<PeerData>;
    /// Looks up a peer by id. Used to resolve the round initiator during
    /// `participate_in_round` (spec.md §4.1).
    async fn get_peer(&self, id: &PeerId) -> Option<PeerData>;
}

/// Consumed: this node's own lifecycle state (spec.md §6).
#[async_trait]
pub trait NodeStorage: Send + Sync {
    async fn get_node_state(&self) -> NodeState;
}

/// Consumed: the remote-sender transport (spec.md §6).
///
/// `notify_facilitators` returns one bool per facilitator in `round_data`'s
/// facilitator set (in iteration order), indicating whether that facilitator
/// acknowledged participation.
#[async_trait]
pub trait RemoteSender: Send + Sync {
    async fn notify_facilitators(&self, round_data: &RoundData) -> Vec<bool>;
    async fn broadcast_data_proposal(&self, peers: &[PeerId], payload: crate::round_protocol::ConsensusDataProposal);
    async fn broadcast_union_block(&self, peers: &[PeerId], payload: crate::round_protocol::UnionBlockProposal);
    async fn broadcast_selected_block(&self, peers: &[PeerId], payload: crate::round_protocol::SelectedUnionBlock);
}

/// Consumed: the checkpoint acceptance/resolution pipeline (spec.md §4.1.1, §6).
#[async_trait]
pub trait CheckpointResolutionQueue: Send + Sync {
    /// Enqueues `hash` for resolution, hinting that `hint_peer` can likely supply it.
    async fn enqueue_checkpoint(&self, hash: Hash, hint_peer: Option<PeerId>);
}

/// Consumed: key-file management / signing is out of scope (spec.md §1); this is
/// the narrow seam the protocol signs block base-hashes through.
pub trait Signer: Send + Sync {
    fn sign(&self, hash: &Hash) -> String;
}
