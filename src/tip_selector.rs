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

//! Tip selection (spec.md §4.3).
//!
//! `StandardTipSelector` is the selector every node runs by default. `TipFilter`
//! is a narrow customization point (SPEC_FULL.md §E.2) that layers additional
//! eligibility checks on top of "confirmed, childless" without touching the
//! two-tip contract itself — the same shape as the teacher's `ProposeBlock`
//! (src/proposer.rs), which lets embedders customize proposal content without
//! touching the block-acceptance contract.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::external::{CheckpointStore, ClusterStorage, PeerData};
use crate::types::{FacilitatorId, Hash, TipsSoe, TypedEdgeHash};

/// Additional per-candidate eligibility check layered on top of the base
/// "confirmed tip" contract. The default accepts anything the base contract
/// already accepted.
pub trait TipFilter: Send + Sync {
    fn accepts(&self, hash: &Hash) -> bool {
        let _ = hash;
        true
    }
}

/// The default filter: no extra restrictions.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl TipFilter for AcceptAll {}

/// Candidate tips supplied by the embedder (the accepted-tip set is maintained
/// outside this crate's scope — see spec.md §1's storage/pruning exclusion).
#[derive(Debug, Clone)]
pub struct TipCandidate {
    pub hash: Hash,
    pub min_height: u64,
    /// Peers known to be able to vouch for (serve/validate) this tip.
    pub vouching_peers: BTreeSet<FacilitatorId>,
}

#[async_trait]
pub trait TipSelector: Send + Sync {
    /// Selects two parent tips and the facilitator set for a starting round.
    ///
    /// Returns `None` if fewer than two eligible tips exist (the caller raises
    /// `NoTipsForConsensus`, spec.md §4.3).
    async fn pull_tips(&self, local_peer: &FacilitatorId) -> Option<(TipsSoe, BTreeSet<FacilitatorId>)>;

    /// The locally accepted snapshot height to guard new rounds against (spec.md
    /// §8), if this selector tracks one. `RoundManager` compares every pulled
    /// `TipsSoe.min_height` against this value via `check_snapshot_height` and
    /// raises `SnapshotHeightAboveTip` instead of starting an unusable round.
    /// Selectors that don't track snapshots (the default) disable the guard.
    fn accepted_snapshot_height(&self) -> Option<u64> {
        None
    }
}

/// Default tip selector: picks two confirmed, childless tips and intersects the
/// cluster's ready+full peer set with peers that can vouch for those tips.
pub struct StandardTipSelector<C, S> {
    candidates: Vec<TipCandidate>,
    cluster: Arc<C>,
    checkpoints: Arc<S>,
    filter: Box<dyn TipFilter>,
    snapshot_height: Option<u64>,
}

impl<C, S> StandardTipSelector<C, S>
where
    C: ClusterStorage,
    S: CheckpointStore,
{
    pub fn new(candidates: Vec<TipCandidate>, cluster: Arc<C>, checkpoints: Arc<S>) -> Self {
        Self {
            candidates,
            cluster,
            checkpoints,
            filter: Box::new(AcceptAll),
            snapshot_height: None,
        }
    }

    pub fn with_filter(mut self, filter: impl TipFilter + 'static) -> Self {
        self.filter = Box::new(filter);
        self
    }

    /// Enables the snapshot-height guard (spec.md §8): rounds built on tips whose
    /// `min_height` does not exceed `height` will be rejected by `RoundManager`.
    pub fn with_snapshot_height(mut self, height: u64) -> Self {
        self.snapshot_height = Some(height);
        self
    }

    async fn eligible_candidates(&self) -> Vec<&TipCandidate> {
        let mut eligible = Vec::new();
        for candidate in &self.candidates {
            if !self.filter.accepts(&candidate.hash) {
                continue;
            }
            if self.checkpoints.is_checkpoint_accepted(&candidate.hash).await {
                eligible.push(candidate);
            }
        }
        eligible
    }
}

#[async_trait]
impl<C, S> TipSelector for StandardTipSelector<C, S>
where
    C: ClusterStorage,
    S: CheckpointStore,
{
    async fn pull_tips(&self, local_peer: &FacilitatorId) -> Option<(TipsSoe, BTreeSet<FacilitatorId>)> {
        let eligible = self.eligible_candidates().await;
        if eligible.len() < 2 {
            return None;
        }
        let picked = &eligible[..2];

        let ready_and_full: BTreeSet<FacilitatorId> = self
            .cluster
            .get_ready_and_full_peers()
            .await
            .into_iter()
            .filter(PeerData::is_usable)
            .map(|p| p.id)
            .collect();

        let mut facilitators: BTreeSet<FacilitatorId> = ready_and_full
            .into_iter()
            .filter(|peer| picked.iter().any(|tip| tip.vouching_peers.contains(peer)))
            .collect();
        facilitators.insert(local_peer.clone());

        let tips_soe = TipsSoe {
            soe: [
                TypedEdgeHash {
                    referenced_hash: picked[0].hash.clone(),
                    edge_type: crate::types::EdgeType::CheckpointHash,
                    base_hash: None,
                },
                TypedEdgeHash {
                    referenced_hash: picked[1].hash.clone(),
                    edge_type: crate::types::EdgeType::CheckpointHash,
                    base_hash: None,
                },
            ],
            min_height: picked[0].min_height.min(picked[1].min_height),
        };

        Some((tips_soe, facilitators))
    }

    fn accepted_snapshot_height(&self) -> Option<u64> {
        self.snapshot_height
    }
}

impl PeerData {
    fn is_usable(&self) -> bool {
        self.ready && self.full
    }
}

/// Checks the snapshot-height guard from spec.md §8: a tip whose minimum height
/// equals the locally accepted snapshot height (or falls below it) cannot seed a
/// new round.
pub fn check_snapshot_height(tips_soe: &TipsSoe, accepted_snapshot_height: u64) -> bool {
    tips_soe.min_height > accepted_snapshot_height
}
