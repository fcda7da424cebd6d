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

//! In-memory fakes for every external collaborator, built only against
//! `consensus_core`'s public API — these drive the crate the way an embedder
//! would, unlike the unit tests' internal fakes.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use consensus_core::{
    CheckpointBlock, CheckpointResolutionQueue, CheckpointStore, ClusterStorage,
    ConsensusDataProposal, FacilitatorId, Hash, NodeState, NodeStorage, ObservationService,
    Observation, PeerData, PeerId, RemoteSender, RoundData, SelectedUnionBlock, Signer,
    TipSelector, TipsSoe, Transaction, TransactionService, TypedEdgeHash, UnionBlockProposal,
};

#[derive(Default)]
pub struct FakeNodeStorage {
    state: Mutex<Option<NodeState>>,
}

impl FakeNodeStorage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Some(NodeState::Ready)),
        }
    }

    pub fn set_state(&self, state: NodeState) {
        *self.state.lock().unwrap() = Some(state);
    }
}

#[async_trait]
impl NodeStorage for FakeNodeStorage {
    async fn get_node_state(&self) -> NodeState {
        self.state.lock().unwrap().unwrap_or(NodeState::Ready)
    }
}

#[derive(Default)]
pub struct FakeCheckpointStore {
    accept_all: AtomicBool,
    accepted: Mutex<HashSet<Hash>>,
    blocks: Mutex<HashMap<Hash, CheckpointBlock>>,
}

impl FakeCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept_all(&self) {
        self.accept_all.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl CheckpointStore for FakeCheckpointStore {
    async fn store_soe(&self, block: &CheckpointBlock) {
        self.blocks.lock().unwrap().insert(block.base_hash.clone(), block.clone());
    }

    async fn store(&self, block: &CheckpointBlock) {
        self.blocks.lock().unwrap().insert(block.base_hash.clone(), block.clone());
    }

    async fn add_to_acceptance(&self, block: &CheckpointBlock) {
        self.accepted.lock().unwrap().insert(block.base_hash.clone());
    }

    async fn is_checkpoint_accepted(&self, hash: &Hash) -> bool {
        self.accept_all.load(Ordering::Relaxed) || self.accepted.lock().unwrap().contains(hash)
    }

    async fn get_checkpoint(&self, hash: &Hash) -> Option<CheckpointBlock> {
        self.blocks.lock().unwrap().get(hash).cloned()
    }

    async fn is_waiting_for_resolving(&self, _hash: &Hash) -> bool {
        false
    }

    async fn is_checkpoint_in_acceptance(&self, _hash: &Hash) -> bool {
        false
    }

    async fn is_checkpoint_waiting_for_acceptance(&self, _hash: &Hash) -> bool {
        false
    }

    async fn is_checkpoint_awaiting(&self, _hash: &Hash) -> bool {
        false
    }
}

#[derive(Default)]
pub struct FakeTransactionService {
    pending: Mutex<Vec<Transaction>>,
    returned: AtomicU64,
}

impl FakeTransactionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, transactions: Vec<Transaction>) {
        self.pending.lock().unwrap().extend(transactions);
    }

    pub fn returned_count(&self) -> u64 {
        self.returned.load(Ordering::Relaxed)
    }
}

/// Builds a minimal transaction suitable for seeding a `FakeTransactionService`.
pub fn fake_tx(hash: &str) -> Transaction {
    Transaction {
        source: "a".into(),
        destination: "b".into(),
        amount: 1,
        last_tx_ref: consensus_core::LastTransactionRef::empty(),
        ordinal: 1,
        signature: "sig".into(),
        is_dummy: false,
        content_hash: hash.into(),
    }
}

#[async_trait]
impl TransactionService for FakeTransactionService {
    async fn pull_for_consensus(&self, max_n: u32) -> Vec<Transaction> {
        let mut pending = self.pending.lock().unwrap();
        let take = (max_n as usize).min(pending.len());
        pending.drain(..take).collect()
    }

    async fn return_to_pending(&self, hashes: &[Hash]) {
        self.returned.fetch_add(hashes.len() as u64, Ordering::Relaxed);
    }

    async fn clear_in_consensus(&self, _hashes: &[Hash]) {}

    async fn accept(&self, _tx: Transaction) {}
}

#[derive(Default)]
pub struct FakeObservationService;

#[async_trait]
impl ObservationService for FakeObservationService {
    async fn pull_for_consensus(&self, _max_n: u32) -> Vec<Observation> {
        Vec::new()
    }

    async fn return_to_pending(&self, _hashes: &[Hash]) {}

    async fn clear_in_consensus(&self, _hashes: &[Hash]) {}

    async fn accept(&self, _observation: Observation) {}
}

#[derive(Default)]
pub struct FakeClusterStorage;

#[async_trait]
impl ClusterStorage for FakeClusterStorage {
    async fn get_peers(&self) -> Vec<PeerData> {
        Vec::new()
    }

    async fn get_ready_and_full_peers(&self) -> Vec<PeerData> {
        Vec::new()
    }

    async fn get_peer(&self, id: &PeerId) -> Option<PeerData> {
        Some(PeerData {
            id: id.clone(),
            ready: true,
            full: true,
        })
    }
}

#[derive(Default)]
pub struct FakeRemoteSender {
    acks: Mutex<Option<Vec<bool>>>,
    union_broadcasts: Mutex<Vec<UnionBlockProposal>>,
    selection_broadcasts: Mutex<Vec<SelectedUnionBlock>>,
}

impl FakeRemoteSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_acks(&self, acks: Vec<bool>) {
        *self.acks.lock().unwrap() = Some(acks);
    }

    pub fn last_union_block(&self) -> UnionBlockProposal {
        self.union_broadcasts.lock().unwrap().last().cloned().expect("no union block broadcast yet")
    }

    pub fn last_selection(&self) -> SelectedUnionBlock {
        self.selection_broadcasts.lock().unwrap().last().cloned().expect("no selection broadcast yet")
    }
}

#[async_trait]
impl RemoteSender for FakeRemoteSender {
    async fn notify_facilitators(&self, round_data: &RoundData) -> Vec<bool> {
        match &*self.acks.lock().unwrap() {
            Some(acks) => acks.clone(),
            None => vec![true; round_data.facilitators.len()],
        }
    }

    async fn broadcast_data_proposal(&self, _peers: &[PeerId], _payload: ConsensusDataProposal) {}

    async fn broadcast_union_block(&self, _peers: &[PeerId], payload: UnionBlockProposal) {
        self.union_broadcasts.lock().unwrap().push(payload);
    }

    async fn broadcast_selected_block(&self, _peers: &[PeerId], payload: SelectedUnionBlock) {
        self.selection_broadcasts.lock().unwrap().push(payload);
    }
}

#[derive(Default)]
pub struct FakeResolutionQueue;

#[async_trait]
impl CheckpointResolutionQueue for FakeResolutionQueue {
    async fn enqueue_checkpoint(&self, _hash: Hash, _hint_peer: Option<PeerId>) {}
}

#[derive(Default)]
pub struct FakeSigner;

impl Signer for FakeSigner {
    fn sign(&self, hash: &Hash) -> String {
        format!("sig:{hash}")
    }
}

#[derive(Default)]
pub struct FakeTipSelector {
    candidate_count: AtomicUsize,
}

impl FakeTipSelector {
    pub fn new() -> Self {
        Self {
            candidate_count: AtomicUsize::new(2),
        }
    }
}

#[async_trait]
impl TipSelector for FakeTipSelector {
    async fn pull_tips(&self, _local_peer: &FacilitatorId) -> Option<(TipsSoe, BTreeSet<FacilitatorId>)> {
        if self.candidate_count.load(Ordering::Relaxed) < 2 {
            return None;
        }
        let tips_soe = TipsSoe {
            soe: [TypedEdgeHash::coinbase_sentinel(), TypedEdgeHash::coinbase_sentinel()],
            min_height: 0,
        };
        let facilitators: BTreeSet<FacilitatorId> = ["f2", "f3"].iter().map(|s| s.to_string()).collect();
        Some((tips_soe, facilitators))
    }
}

/// One of each fake collaborator, wired the way an embedder would construct
/// `RoundManager`'s dependencies.
pub struct Fixture {
    pub tip_selector: std::sync::Arc<FakeTipSelector>,
    pub transactions: std::sync::Arc<FakeTransactionService>,
    pub observations: std::sync::Arc<FakeObservationService>,
    pub cluster: std::sync::Arc<FakeClusterStorage>,
    pub node_storage: std::sync::Arc<FakeNodeStorage>,
    pub sender: std::sync::Arc<FakeRemoteSender>,
    pub resolution_queue: std::sync::Arc<FakeResolutionQueue>,
    pub checkpoint_store: std::sync::Arc<FakeCheckpointStore>,
    pub signer: std::sync::Arc<FakeSigner>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            tip_selector: std::sync::Arc::new(FakeTipSelector::new()),
            transactions: std::sync::Arc::new(FakeTransactionService::new()),
            observations: std::sync::Arc::new(FakeObservationService::default()),
            cluster: std::sync::Arc::new(FakeClusterStorage::default()),
            node_storage: std::sync::Arc::new(FakeNodeStorage::new()),
            sender: std::sync::Arc::new(FakeRemoteSender::new()),
            resolution_queue: std::sync::Arc::new(FakeResolutionQueue::default()),
            checkpoint_store: std::sync::Arc::new(FakeCheckpointStore::new()),
            signer: std::sync::Arc::new(FakeSigner),
        }
    }
}

