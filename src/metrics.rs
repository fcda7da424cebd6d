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

//! Metrics sink (spec.md §1 names metrics reporting as an external collaborator;
//! this is the narrow interface the round lifecycle reports through).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Counters the round lifecycle manager and protocol report to.
pub trait MetricsSink: Send + Sync {
    fn round_started(&self) {}
    fn round_stopped(&self) {}
    fn round_timed_out(&self) {}
    fn round_committed(&self) {}
    fn error(&self, kind: &'static str) {
        let _ = kind;
    }
    fn proposal_discarded(&self) {}
}

/// A sink that drops every counter. The default for embedders that don't wire up
/// reporting.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

/// An in-memory sink backed by atomics, for assertions in tests.
#[derive(Debug, Default)]
pub struct CountingMetrics {
    started: AtomicU64,
    stopped: AtomicU64,
    timed_out: AtomicU64,
    committed: AtomicU64,
    discarded: AtomicU64,
    errors: Mutex<HashMap<&'static str, u64>>,
}

impl CountingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    pub fn stopped(&self) -> u64 {
        self.stopped.load(Ordering::Relaxed)
    }

    pub fn timed_out(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }

    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    pub fn error_count(&self, kind: &str) -> u64 {
        self.errors.lock().unwrap().get(kind).copied().unwrap_or(0)
    }
}

impl MetricsSink for CountingMetrics {
    fn round_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    fn round_stopped(&self) {
        self.stopped.fetch_add(1, Ordering::Relaxed);
    }

    fn round_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    fn round_committed(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    fn error(&self, kind: &'static str) {
        *self.errors.lock().unwrap().entry(kind).or_insert(0) += 1;
    }

    fn proposal_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }
}
