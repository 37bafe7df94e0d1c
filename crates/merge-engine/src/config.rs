//! Engine configuration, environment-driven with sane defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::evaluator::MergeParams;

const DEFAULT_WORKERS: usize = 3;
const DEFAULT_RUN_MS: u64 = 10_000;
const DEFAULT_SEED: u64 = 0xC0FF_EE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub params: MergeParams,
    /// Worker count; the coordinator is always exactly one.
    pub workers: usize,
    /// Wall-clock budget for the whole run.
    pub run_for_ms: u64,
    /// Base seed; each worker derives its own stream from seed + rank.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            params: MergeParams::default(),
            workers: DEFAULT_WORKERS,
            run_for_ms: DEFAULT_RUN_MS,
            seed: DEFAULT_SEED,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    /// Read configuration from `CONFLUX_*` environment variables, falling
    /// back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            params: MergeParams {
                overlap_threshold: env_parse(
                    "CONFLUX_OVERLAP_THRESHOLD",
                    defaults.params.overlap_threshold,
                ),
                edge_threshold: env_parse("CONFLUX_EDGE_THRESHOLD", defaults.params.edge_threshold),
                ev_delta: env_parse("CONFLUX_EV_DELTA", defaults.params.ev_delta),
                max_community_size: env_parse(
                    "CONFLUX_MAX_COMMUNITY_SIZE",
                    defaults.params.max_community_size,
                ),
            },
            workers: env_parse("CONFLUX_WORKERS", defaults.workers),
            run_for_ms: env_parse("CONFLUX_RUN_MS", defaults.run_for_ms),
            seed: env_parse("CONFLUX_SEED", defaults.seed),
        }
    }

    pub fn run_for(&self) -> Duration {
        Duration::from_millis(self.run_for_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_parameters() {
        let config = EngineConfig::default();
        assert_eq!(config.params.overlap_threshold, 0.1);
        assert_eq!(config.params.edge_threshold, 0.5);
        assert_eq!(config.params.ev_delta, 0.001);
        assert_eq!(config.params.max_community_size, 400);
        assert_eq!(config.run_for(), Duration::from_secs(10));
    }
}
