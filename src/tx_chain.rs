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

//! Per-address strict-ordinal transaction chain (spec.md §4.4).

use dashmap::DashMap;

use crate::types::{Address, LastTransactionRef, Transaction};

/// Tracks the last accepted transaction ref for every address.
///
/// Concurrent `set_last_transaction` calls on the *same* address must serialize and
/// observe each other's updates; calls on different addresses must not contend.
/// `DashMap` gives us that directly: each shard is its own lock, so the
/// read-modify-write below only ever blocks callers touching the same address.
#[derive(Debug, Default)]
pub struct TxChain {
    refs: DashMap<Address, LastTransactionRef>,
}

impl TxChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded ref for `address`, or the empty ref if none exists yet.
    pub fn get_last_ref(&self, address: &str) -> LastTransactionRef {
        self.refs
            .get(address)
            .map(|entry| entry.clone())
            .unwrap_or_else(LastTransactionRef::empty)
    }

    /// Atomically reads the previous ref, builds the next transaction extending it,
    /// and stores the new ref — all under one entry lock, so a concurrent caller on
    /// the same address can't observe a torn update (spec.md §4.4, §8 invariant 2).
    pub fn set_last_transaction(
        &self,
        source: Address,
        destination: Address,
        amount: u64,
        signature: String,
        is_dummy: bool,
    ) -> Transaction {
        let mut entry = self.refs.entry(source.clone()).or_insert_with(LastTransactionRef::empty);
        let prev = entry.clone();
        let ordinal = prev.ordinal + 1;
        let content_hash = Transaction::compute_content_hash(
            &source,
            &destination,
            amount,
            &prev,
            ordinal,
            is_dummy,
        );
        *entry = LastTransactionRef {
            prev_hash: content_hash.clone(),
            ordinal,
        };
        drop(entry);

        Transaction {
            source,
            destination,
            amount,
            last_tx_ref: prev,
            ordinal,
            signature,
            is_dummy,
            content_hash,
        }
    }

    /// Prunes the recorded ref for `address` once its last ordinal is fully
    /// persisted past the snapshot horizon (spec.md §9 open question).
    ///
    /// Callers are responsible for knowing the ref is safe to drop; this is a plain
    /// removal, not a check.
    pub fn prune(&self, address: &str) {
        self.refs.remove(address);
    }
}
