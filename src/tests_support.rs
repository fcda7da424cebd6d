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

//! In-memory fakes for every external collaborator, used by `round_manager`'s
//! tests. Kept separate from `tests/` (which drives the crate only through its
//! public API) because `RoundManager`'s unit tests need direct field access.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::external::{
    CheckpointResolutionQueue, CheckpointStore, ClusterStorage, NodeState, NodeStorage, PeerData,
    RemoteSender, Signer, TransactionService, ObservationService,
};
use crate::metrics::CountingMetrics;
use crate::round_protocol::{ConsensusDataProposal, SelectedUnionBlock, UnionBlockProposal};
use crate::tip_selector::TipSelector;
use crate::types::{
    CheckpointBlock, FacilitatorId, Hash, LastTransactionRef, Observation, PeerId, RoundData,
    Transaction, TypedEdgeHash, TipsSoe,
};

pub fn fake_tx(hash: &str) -> Transaction {
    Transaction {
        source: "a".into(),
        destination: "b".into(),
        amount: 1,
        last_tx_ref: LastTransactionRef::empty(),
        ordinal: 1,
        signature: "sig".into(),
        is_dummy: false,
        content_hash: hash.into(),
    }
}

pub struct FakeNodeStorage {
    state: Mutex<NodeState>,
}

impl FakeNodeStorage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NodeState::Ready),
        }
    }

    pub fn set_state(&self, state: NodeState) {
        *self.state.lock().unwrap() = state;
    }
}

#[async_trait]
impl NodeStorage for FakeNodeStorage {
    async fn get_node_state(&self) -> NodeState {
        *self.state.lock().unwrap()
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
pub struct FakeObservationService {
    returned: AtomicU64,
}

impl FakeObservationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returned_count(&self) -> u64 {
        self.returned.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ObservationService for FakeObservationService {
    async fn pull_for_consensus(&self, _max_n: u32) -> Vec<Observation> {
        Vec::new()
    }

    async fn return_to_pending(&self, hashes: &[Hash]) {
        self.returned.fetch_add(hashes.len() as u64, Ordering::Relaxed);
    }

    async fn clear_in_consensus(&self, _hashes: &[Hash]) {}

    async fn accept(&self, _observation: Observation) {}
}

#[derive(Default)]
pub struct FakeClusterStorage;

impl FakeClusterStorage {
    pub fn new() -> Self {
        Self
    }
}

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
    hang: AtomicBool,
}

impl FakeRemoteSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_acks(&self, acks: Vec<bool>) {
        *self.acks.lock().unwrap() = Some(acks);
    }

    pub fn hang_forever(&self) {
        self.hang.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl RemoteSender for FakeRemoteSender {
    async fn notify_facilitators(&self, round_data: &RoundData) -> Vec<bool> {
        if self.hang.load(Ordering::Relaxed) {
            std::future::pending::<()>().await;
        }
        match &*self.acks.lock().unwrap() {
            Some(acks) => acks.clone(),
            None => vec![true; round_data.facilitators.len()],
        }
    }

    async fn broadcast_data_proposal(&self, _peers: &[PeerId], _payload: ConsensusDataProposal) {}

    async fn broadcast_union_block(&self, _peers: &[PeerId], _payload: UnionBlockProposal) {}

    async fn broadcast_selected_block(&self, _peers: &[PeerId], _payload: SelectedUnionBlock) {}
}

#[derive(Default)]
pub struct FakeResolutionQueue {
    enqueued: Mutex<Vec<Hash>>,
}

impl FakeResolutionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueued_count(&self) -> usize {
        self.enqueued.lock().unwrap().len()
    }
}

#[async_trait]
impl CheckpointResolutionQueue for FakeResolutionQueue {
    async fn enqueue_checkpoint(&self, hash: Hash, _hint_peer: Option<PeerId>) {
        self.enqueued.lock().unwrap().push(hash);
    }
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
    snapshot_height: Mutex<Option<u64>>,
    min_height: AtomicU64,
}

impl FakeTipSelector {
    pub fn new() -> Self {
        Self {
            candidate_count: AtomicUsize::new(2),
            snapshot_height: Mutex::new(None),
            min_height: AtomicU64::new(0),
        }
    }

    pub fn set_candidate_count(&self, count: usize) {
        self.candidate_count.store(count, Ordering::Relaxed);
    }

    /// Sets the value `accepted_snapshot_height` reports, enabling the guard.
    pub fn set_snapshot_height(&self, height: Option<u64>) {
        *self.snapshot_height.lock().unwrap() = height;
    }

    /// Sets the `min_height` reported on the pulled `TipsSoe`.
    pub fn set_min_height(&self, height: u64) {
        self.min_height.store(height, Ordering::Relaxed);
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
            min_height: self.min_height.load(Ordering::Relaxed),
        };
        let facilitators: BTreeSet<FacilitatorId> = ["f2", "f3"].iter().map(|s| s.to_string()).collect();
        Some((tips_soe, facilitators))
    }

    fn accepted_snapshot_height(&self) -> Option<u64> {
        *self.snapshot_height.lock().unwrap()
    }
}

pub struct Fixture {
    pub tip_selector: Arc<FakeTipSelector>,
    pub transactions: Arc<FakeTransactionService>,
    pub observations: Arc<FakeObservationService>,
    pub cluster: Arc<FakeClusterStorage>,
    pub node_storage: Arc<FakeNodeStorage>,
    pub sender: Arc<FakeRemoteSender>,
    pub resolution_queue: Arc<FakeResolutionQueue>,
    pub checkpoint_store: Arc<FakeCheckpointStore>,
    pub signer: Arc<FakeSigner>,
    pub metrics: Arc<CountingMetrics>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            tip_selector: Arc::new(FakeTipSelector::new()),
            transactions: Arc::new(FakeTransactionService::new()),
            observations: Arc::new(FakeObservationService::new()),
            cluster: Arc::new(FakeClusterStorage::new()),
            node_storage: Arc::new(FakeNodeStorage::new()),
            sender: Arc::new(FakeRemoteSender::new()),
            resolution_queue: Arc::new(FakeResolutionQueue::new()),
            checkpoint_store: Arc::new(FakeCheckpointStore::new()),
            signer: Arc::new(FakeSigner),
            metrics: Arc::new(CountingMetrics::new()),
        }
    }
}
