// Run-level guard: decides when a run is abandoned with status `fail`.
use std::time::Instant;

use crate::config::{LoopMode, RunConfig};

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub mode: LoopMode,
    pub max_duration_minutes: Option<u32>,
    pub max_failures: Option<u32>,
    pub max_cycles: Option<u32>,
}

impl From<&RunConfig> for LoopConfig {
    fn from(run: &RunConfig) -> Self {
        Self {
            mode: run.loop_mode,
            max_duration_minutes: run.max_duration_minutes,
            max_failures: run.max_failures,
            max_cycles: run.max_cycles,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            mode: LoopMode::UntilDone,
            max_duration_minutes: None,
            max_failures: None,
            max_cycles: None,
        }
    }
}

pub struct LoopController {
    config: LoopConfig,
    start_time: Instant,
    failure_count: u32,
    cycle_count: u32,
}

impl LoopController {
    pub fn new(config: LoopConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            failure_count: 0,
            cycle_count: 0,
        }
    }

    /// Restart the clock and counters for a new run.
    pub fn reset(&mut self) {
        self.start_time = Instant::now();
        self.failure_count = 0;
        self.cycle_count = 0;
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
    }

    pub fn record_cycle(&mut self) {
        self.cycle_count += 1;
    }

    pub fn failures(&self) -> u32 {
        self.failure_count
    }

    pub fn cycles(&self) -> u32 {
        self.cycle_count
    }

    pub fn should_stop(&self) -> bool {
        match &self.config.mode {
            LoopMode::UntilDone => false,
            LoopMode::Timed => {
                if let Some(max_min) = self.config.max_duration_minutes {
                    self.start_time.elapsed().as_secs() / 60 >= max_min as u64
                } else {
                    false
                }
            }
            LoopMode::FailureLimit => {
                if let Some(max_fail) = self.config.max_failures {
                    self.failure_count >= max_fail
                } else {
                    false
                }
            }
            LoopMode::CycleLimit => {
                if let Some(max_cycles) = self.config.max_cycles {
                    self.cycle_count >= max_cycles
                } else {
                    false
                }
            }
        }
    }
}
