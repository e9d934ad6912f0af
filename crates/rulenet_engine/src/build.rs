//! Rule compilation into a knowledge base.
//!
//! Packages compile in parallel on a pool owned by the [`BuildContext`].
//! The pool is built from [`BuildConfig`] and dropped with the context;
//! nothing here touches rayon's global pool.

use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use rulenet_foundation::{Error, Result};
use tracing::debug;

use crate::config::{BuildConfig, SessionConfig};
use crate::rule::{CompiledRule, DEFAULT_PACKAGE, RuleDefinition, check_unique};
use crate::session::Session;

/// A named group of rule definitions.
///
/// The package name overrides whatever package each definition carries.
#[derive(Clone, Debug)]
pub struct RulePackage {
    name: Arc<str>,
    rules: Vec<RuleDefinition>,
}

impl RulePackage {
    /// Creates an empty package.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    /// Adds a rule (builder style).
    #[must_use]
    pub fn rule(mut self, rule: RuleDefinition) -> Self {
        self.rules.push(rule);
        self
    }

    /// Package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rules declared.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if the package declares no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn compile(self) -> Result<Vec<CompiledRule>> {
        let name = self.name;
        let compiled = self
            .rules
            .into_iter()
            .map(|rule| rule.package(Arc::clone(&name)).compile())
            .collect::<Result<Vec<_>>>()?;
        check_unique(&compiled)?;
        Ok(compiled)
    }
}

impl Default for RulePackage {
    fn default() -> Self {
        Self::new(DEFAULT_PACKAGE)
    }
}

/// Owns the bounded pool rule compilation runs on.
pub struct BuildContext {
    pool: ThreadPool,
    config: BuildConfig,
}

impl BuildContext {
    /// Creates a context with its own worker pool.
    ///
    /// # Errors
    /// Returns `Build` if the pool cannot be created.
    pub fn new(config: BuildConfig) -> Result<Self> {
        let prefix = config.thread_name.clone();
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers.max(1))
            .thread_name(move |index| format!("{prefix}-{index}"))
            .build()
            .map_err(|err| Error::build(format!("build pool: {err}")))?;
        debug!(workers = config.workers, "build context created");
        Ok(Self { pool, config })
    }

    /// Configuration this context was created with.
    #[must_use]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Compiles every package into a knowledge base.
    ///
    /// Rules keep package order, then declaration order, regardless of how
    /// the pool schedules the work.
    ///
    /// # Errors
    /// Returns `Build` for the first invalid rule or duplicate identity.
    pub fn build(&self, packages: Vec<RulePackage>) -> Result<KnowledgeBase> {
        let compiled = self.pool.install(|| {
            packages
                .into_par_iter()
                .map(RulePackage::compile)
                .collect::<Result<Vec<_>>>()
        })?;
        let compiled: Vec<CompiledRule> = compiled.into_iter().flatten().collect();
        check_unique(&compiled)?;
        debug!(rules = compiled.len(), "knowledge base built");
        Ok(KnowledgeBase {
            rules: compiled.into_iter().map(Arc::new).collect(),
        })
    }
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("workers", &self.pool.current_num_threads())
            .field("config", &self.config)
            .finish()
    }
}

/// Compiled rules that sessions are created from.
#[derive(Clone, Debug, Default)]
pub struct KnowledgeBase {
    rules: Vec<Arc<CompiledRule>>,
}

impl KnowledgeBase {
    /// Compiled rules in package, then declaration, order.
    #[must_use]
    pub fn rules(&self) -> &[Arc<CompiledRule>] {
        &self.rules
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Creates a session over every rule.
    ///
    /// # Errors
    /// Propagates [`Session::new`] errors.
    pub fn new_session(&self, config: SessionConfig) -> Result<Session> {
        Session::new(&self.rules, config)
    }
}
