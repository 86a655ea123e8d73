use std::time::Duration;

use rand::Rng;

use switchyard_core::config::SimulationConfig;

/// Latency source for the simulated providers.
#[derive(Debug, Clone, Copy)]
pub struct Simulator {
    min_ms: u64,
    max_ms: u64,
}

impl Simulator {
    pub fn new(config: &SimulationConfig) -> Self {
        let min_ms = config.min_latency_ms.min(config.max_latency_ms);
        Self {
            min_ms,
            max_ms: config.max_latency_ms,
        }
    }

    pub fn instant() -> Self {
        Self::new(&SimulationConfig::instant())
    }

    pub fn bounds(&self) -> (u64, u64) {
        (self.min_ms, self.max_ms)
    }

    /// Sleep a random duration within the configured bounds; returns it in ms.
    pub async fn pause(&self) -> u64 {
        let ms = random_between(self.min_ms, self.max_ms);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        ms
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(&SimulationConfig::default())
    }
}

/// Inclusive random integer. The thread RNG never lives across an await.
pub fn random_between(lo: u64, hi: u64) -> u64 {
    if lo >= hi {
        return lo;
    }
    rand::thread_rng().gen_range(lo..=hi)
}
