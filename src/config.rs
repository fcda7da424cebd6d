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

//! Recognized configuration options (spec.md §6).
//!
//! Loading this struct from a file or CLI flags is out of scope for this crate
//! (spec.md §1); embedders construct it directly or deserialize it themselves.

use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

/// Consensus-core configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// `consensus.maxTransactionThreshold`: cap on transactions pulled per round.
    pub max_transaction_threshold: u32,
    /// `consensus.maxObservationThreshold`: cap on observations pulled per round.
    pub max_observation_threshold: u32,
    /// `constellation.consensus.form-checkpoint-blocks-timeout`: whole-round timeout.
    #[serde(with = "humantime_duration")]
    pub form_checkpoint_blocks_timeout: Duration,
    /// `constellation.cache.expire-after-min.cache`: proposal-buffer TTL, in minutes.
    pub proposal_cache_expire_after_min: u32,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            max_transaction_threshold: 200,
            max_observation_threshold: 50,
            form_checkpoint_blocks_timeout: Duration::from_secs(45),
            proposal_cache_expire_after_min: 10,
        }
    }
}

impl Configuration {
    pub fn proposal_cache_ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.proposal_cache_expire_after_min) * 60)
    }
}

/// Serializes a `Duration` as whole seconds, so the config survives a round trip
/// through `toml`/`serde_json` without pulling in a dedicated duration crate.
mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
