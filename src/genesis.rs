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

//! DAG bootstrap (spec.md §4.5).
//!
//! Grounded in the teacher's genesis-block construction (`blockchain/genesis.rs`'s
//! `GenesisConfig`, `blockchain/builder.rs`'s `create_genesis_block`): a fixed,
//! deterministic block is built once, persisted, and accepted before the network
//! runs its first round. Here the bootstrap produces three blocks instead of one —
//! a self-parented genesis block carrying the initial coinbase transactions, and
//! two sibling distribution blocks (empty of transactions, per spec.md §4.5) that
//! become the DAG's first two tips, so `TipSelector` has two distinct candidates
//! to hand `RoundManager` for the very first round.

use crate::external::{CheckpointStore, Signer};
use crate::types::{
    Address, CheckpointBlock, EdgeType, Height, LastTransactionRef, Transaction, TypedEdgeHash,
};
use std::sync::Arc;

/// The three blocks a freshly bootstrapped DAG starts from.
#[derive(Debug, Clone)]
pub struct GenesisOutput {
    pub genesis_block: CheckpointBlock,
    pub genesis_height: Height,
    /// The two sibling blocks installed as the DAG's initial tips.
    pub distribution_blocks: [CheckpointBlock; 2],
    pub distribution_height: Height,
}

/// Builds and persists the genesis and distribution blocks for a fresh DAG.
pub struct GenesisBuilder {
    checkpoint_store: Arc<dyn CheckpointStore>,
    signer: Arc<dyn Signer>,
}

impl GenesisBuilder {
    pub fn new(checkpoint_store: Arc<dyn CheckpointStore>, signer: Arc<dyn Signer>) -> Self {
        Self {
            checkpoint_store,
            signer,
        }
    }

    /// Builds one coinbase transaction per `(address, amount)` pair into a
    /// self-parented genesis block, then two sibling distribution blocks (empty of
    /// transactions, per spec.md §4.5) parented on it, persisting all three and
    /// returning them as the DAG's initial tips. `balances` must be non-empty.
    pub async fn bootstrap(&self, balances: &[(Address, u64)]) -> GenesisOutput {
        assert!(!balances.is_empty(), "genesis requires at least one seeded balance");

        let coinbase_transactions: Vec<Transaction> = balances
            .iter()
            .map(|(address, amount)| self.coinbase_transaction(address, *amount))
            .collect();

        let genesis_block = self.sealed_block(coinbase_transactions, vec![], [
            TypedEdgeHash::coinbase_sentinel(),
            TypedEdgeHash::coinbase_sentinel(),
        ]);
        self.persist(&genesis_block).await;

        let genesis_parent = TypedEdgeHash {
            referenced_hash: genesis_block.soe_hash.clone(),
            edge_type: EdgeType::CheckpointHash,
            base_hash: Some(genesis_block.base_hash.clone()),
        };

        let distribution_blocks = [
            self.sealed_block(vec![], vec![], [genesis_parent.clone(), genesis_parent.clone()]),
            self.sealed_block(vec![], vec![], [genesis_parent.clone(), genesis_parent.clone()]),
        ];
        for block in &distribution_blocks {
            self.persist(block).await;
        }

        GenesisOutput {
            genesis_block,
            genesis_height: Height::genesis(),
            distribution_blocks,
            distribution_height: Height::new(1, 1),
        }
    }

    fn coinbase_transaction(&self, address: &Address, amount: u64) -> Transaction {
        let last_tx_ref = LastTransactionRef::empty();
        let content_hash = Transaction::compute_content_hash(
            &"coinbase".to_string(),
            address,
            amount,
            &last_tx_ref,
            1,
            true,
        );
        let signature = self.signer.sign(&content_hash);
        Transaction {
            source: "coinbase".to_string(),
            destination: address.clone(),
            amount,
            last_tx_ref,
            ordinal: 1,
            signature,
            is_dummy: true,
            content_hash,
        }
    }

    fn sealed_block(
        &self,
        transactions: Vec<Transaction>,
        observations: Vec<crate::types::Observation>,
        parent_tips: [TypedEdgeHash; 2],
    ) -> CheckpointBlock {
        let mut block = CheckpointBlock::new(transactions, observations, parent_tips);
        let signature = self.signer.sign(&block.base_hash);
        block.signatures.insert(signature);
        block.seal_soe();
        block
    }

    async fn persist(&self, block: &CheckpointBlock) {
        self.checkpoint_store.store_soe(block).await;
        self.checkpoint_store.add_to_acceptance(block).await;
    }
}
