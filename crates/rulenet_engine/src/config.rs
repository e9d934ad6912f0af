//! Configuration for sessions and rule builds.

use rulenet_network::TupleMemory;

/// Default kill switch for a single `fire_all_rules` call.
pub const DEFAULT_MAX_ACTIVATIONS: usize = 10_000;

/// Configuration for a [`Session`](crate::Session).
///
/// Controls declarative-agenda mode, the fire loop kill switch, and the
/// initial size of join memories.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Whether matches are materialised as facts and may block each other.
    pub declarative_agenda: bool,

    /// Maximum activations a single fire call may fire before failing.
    pub max_activations: usize,

    /// Initial bucket count of every join node memory.
    pub memory_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            declarative_agenda: false,
            max_activations: DEFAULT_MAX_ACTIVATIONS,
            memory_capacity: TupleMemory::DEFAULT_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Creates a configuration with the declarative agenda enabled.
    #[must_use]
    pub fn declarative() -> Self {
        Self {
            declarative_agenda: true,
            ..Self::default()
        }
    }

    /// Creates a configuration for tests: small memories, low kill switch.
    #[must_use]
    pub fn testing() -> Self {
        Self {
            declarative_agenda: false,
            max_activations: 1_000,
            memory_capacity: 4,
        }
    }

    /// Builder method to enable/disable the declarative agenda.
    #[must_use]
    pub fn with_declarative_agenda(mut self, enabled: bool) -> Self {
        self.declarative_agenda = enabled;
        self
    }

    /// Builder method to set the kill switch.
    #[must_use]
    pub fn with_max_activations(mut self, limit: usize) -> Self {
        self.max_activations = limit;
        self
    }

    /// Builder method to set the initial join memory capacity.
    ///
    /// Zero is raised to one.
    #[must_use]
    pub fn with_memory_capacity(mut self, capacity: usize) -> Self {
        self.memory_capacity = capacity.max(1);
        self
    }
}

/// Configuration for a [`BuildContext`](crate::BuildContext).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildConfig {
    /// Worker threads in the build pool.
    pub workers: usize,

    /// Prefix given to build worker thread names.
    pub thread_name: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            thread_name: "rulenet-build".to_string(),
        }
    }
}

impl BuildConfig {
    /// Creates a configuration that compiles on a single worker.
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            workers: 1,
            ..Self::default()
        }
    }

    /// Builder method to set the worker count. Zero is raised to one.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Builder method to set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}
