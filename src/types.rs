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

//! The checkpoint-DAG data model (spec.md §3).

use std::collections::BTreeSet;
use std::time::Instant;

use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

/// A stable textual identifier derived from a public key.
///
/// The derivation itself is opaque to this crate (spec.md §3); we only need
/// `Address` to be orderable and hashable so it can key the transaction chain.
pub type Address = String;

/// A content hash, hex-encoded. Kept as an owned `String` rather than a fixed-size
/// array so this crate stays agnostic to the hash function a given deployment uses.
pub type Hash = String;

/// Universally unique round identifier (128 random bits, spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoundId(pub Uuid);

impl RoundId {
    /// Generates a fresh round-id from 128 random bits.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RoundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A peer taking part in a round, or in the cluster at large.
pub type PeerId = String;

/// Reference to the previous transaction in a sender's chain (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastTransactionRef {
    pub prev_hash: Hash,
    pub ordinal: u64,
}

impl LastTransactionRef {
    /// The initial, empty value: no previous hash, ordinal zero.
    pub fn empty() -> Self {
        Self {
            prev_hash: String::new(),
            ordinal: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prev_hash.is_empty() && self.ordinal == 0
    }
}

/// A single transaction (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub source: Address,
    pub destination: Address,
    pub amount: u64,
    pub last_tx_ref: LastTransactionRef,
    pub ordinal: u64,
    pub signature: String,
    pub is_dummy: bool,
    pub content_hash: Hash,
}

impl Transaction {
    /// Deterministic content hash over every field but the signature.
    ///
    /// Production deployments hash over a canonical byte encoding; the crate's
    /// contract only requires determinism and exclusion of the signature, so a
    /// descriptive string digest is sufficient here and keeps the crate free of a
    /// hashing-library dependency it does not otherwise need.
    pub fn compute_content_hash(
        source: &Address,
        destination: &Address,
        amount: u64,
        last_tx_ref: &LastTransactionRef,
        ordinal: u64,
        is_dummy: bool,
    ) -> Hash {
        format!(
            "tx:{source}:{destination}:{amount}:{}:{}:{ordinal}:{is_dummy}",
            last_tx_ref.prev_hash, last_tx_ref.ordinal
        )
    }
}

/// An observation about another node's behavior (spec.md glossary).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub observer: PeerId,
    pub observed: PeerId,
    pub signature: String,
    pub content_hash: Hash,
}

/// Edge kind carried by a `TypedEdgeHash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeType {
    CheckpointHash,
}

/// A typed reference to a prior checkpoint block (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedEdgeHash {
    pub referenced_hash: Hash,
    pub edge_type: EdgeType,
    pub base_hash: Option<Hash>,
}

impl TypedEdgeHash {
    /// The sentinel self-reference genesis blocks use for both of their parents.
    pub fn coinbase_sentinel() -> Self {
        Self {
            referenced_hash: "coinbase".to_string(),
            edge_type: EdgeType::CheckpointHash,
            base_hash: None,
        }
    }
}

/// Minimum/maximum height of a checkpoint block (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Height {
    pub min: u64,
    pub max: u64,
}

impl Height {
    pub const fn genesis() -> Self {
        Self { min: 0, max: 0 }
    }

    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }
}

/// The unit of commit: a checkpoint block (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointBlock {
    pub transactions: Vec<Transaction>,
    pub observations: Vec<Observation>,
    /// Exactly two parent tips (invariant enforced at construction, see
    /// `CheckpointBlock::new`).
    pub parent_tips: [TypedEdgeHash; 2],
    pub signatures: BTreeSet<String>,
    pub soe_hash: Hash,
    pub base_hash: Hash,
}

impl CheckpointBlock {
    /// Builds a block, computing its `base_hash` deterministically over the payload
    /// (transactions, observations, and parent tips) excluding signatures.
    pub fn new(
        transactions: Vec<Transaction>,
        observations: Vec<Observation>,
        parent_tips: [TypedEdgeHash; 2],
    ) -> Self {
        let base_hash = Self::compute_base_hash(&transactions, &observations, &parent_tips);
        Self {
            transactions,
            observations,
            parent_tips,
            signatures: BTreeSet::new(),
            soe_hash: String::new(),
            base_hash,
        }
    }

    pub fn compute_base_hash(
        transactions: &[Transaction],
        observations: &[Observation],
        parent_tips: &[TypedEdgeHash; 2],
    ) -> Hash {
        let tx_part: Vec<&str> = transactions.iter().map(|t| t.content_hash.as_str()).collect();
        let obs_part: Vec<&str> = observations.iter().map(|o| o.content_hash.as_str()).collect();
        format!(
            "block:{}:{}:{}:{}",
            tx_part.join(","),
            obs_part.join(","),
            parent_tips[0].referenced_hash,
            parent_tips[1].referenced_hash
        )
    }

    /// Computes and installs the `soe_hash` over the (now signed) observation edge.
    pub fn seal_soe(&mut self) {
        let sig_part: Vec<&str> = self.signatures.iter().map(String::as_str).collect();
        self.soe_hash = format!("soe:{}:{}", self.base_hash, sig_part.join(","));
    }
}

/// Facilitator identity within a round.
pub type FacilitatorId = PeerId;

/// The two tips plus their reported minimum height, as returned by `TipSelector`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipsSoe {
    pub soe: [TypedEdgeHash; 2],
    pub min_height: u64,
}

/// Per-round state owned by the manager and handed to the protocol (spec.md §3).
#[derive(Debug, Clone)]
pub struct RoundData {
    pub round_id: RoundId,
    pub facilitators: BTreeSet<FacilitatorId>,
    pub own_facilitator_id: FacilitatorId,
    pub selected_transactions: Vec<Transaction>,
    pub selected_observations: Vec<Observation>,
    pub tips_soe: TipsSoe,
    pub arrived_peers: BTreeSet<FacilitatorId>,
}

/// Handle to a round's live protocol state machine, shared between the manager
/// and whatever feeds it incoming peer messages.
pub type ProtocolHandle = std::sync::Arc<tokio::sync::Mutex<crate::round_protocol::RoundProtocol>>;

/// Bookkeeping entry for a round this node merely participates in (or, inside
/// `OwnConsensus`, initiated itself).
#[derive(Debug, Clone)]
pub struct ConsensusInfo {
    pub round_id: RoundId,
    pub protocol: ProtocolHandle,
    pub tip_min_height: u64,
    pub start_time: Instant,
}

/// The single slot for a round this node itself initiated.
#[derive(Debug, Clone)]
pub struct OwnConsensus {
    pub round_id: RoundId,
    pub info: Option<ConsensusInfo>,
}
