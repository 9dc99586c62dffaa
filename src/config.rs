use std::time::Duration;

/// Bytes per sweep above which the loop yields instead of sleeping.
pub const DEFAULT_PACING_THRESHOLD: usize = 1024;
/// Upper bound of the idle wait between quiet sweeps.
pub const DEFAULT_IDLE_SLEEP: Duration = Duration::from_millis(1);
/// Readiness events collected per idle wait.
pub const DEFAULT_EVENTS_CAPACITY: usize = 1024;
pub const DEFAULT_THREAD_NAME: &str = "asyncnet-poll";

/// Configuration for the polling engine.
///
/// ## Pacing
///
/// After each sweep the loop compares the bytes it received against
/// `pacing_threshold`. At or below the threshold it waits up to `idle_sleep`
/// (returning early when a socket becomes readable); above it, it only
/// yields the processor so a busy engine keeps draining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub pacing_threshold: usize,
    pub idle_sleep: Duration,
    pub events_capacity: usize,
    pub thread_name: String,
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pacing_threshold: DEFAULT_PACING_THRESHOLD,
            idle_sleep: DEFAULT_IDLE_SLEEP,
            events_capacity: DEFAULT_EVENTS_CAPACITY,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

/// Builder for EngineConfig. Unset fields fall back to EngineConfig::default().
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    pacing_threshold: Option<usize>,
    idle_sleep: Option<Duration>,
    events_capacity: Option<usize>,
    thread_name: Option<String>,
}

impl EngineConfigBuilder {
    pub fn pacing_threshold(mut self, bytes: usize) -> Self {
        self.pacing_threshold = Some(bytes);
        self
    }

    pub fn idle_sleep(mut self, sleep: Duration) -> Self {
        self.idle_sleep = Some(sleep);
        self
    }

    pub fn events_capacity(mut self, capacity: usize) -> Self {
        self.events_capacity = Some(capacity);
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    pub fn build(self) -> EngineConfig {
        let default = EngineConfig::default();
        EngineConfig {
            pacing_threshold: self.pacing_threshold.unwrap_or(default.pacing_threshold),
            idle_sleep: self.idle_sleep.unwrap_or(default.idle_sleep),
            events_capacity: self.events_capacity.unwrap_or(default.events_capacity),
            thread_name: self.thread_name.unwrap_or(default.thread_name),
        }
    }
}
