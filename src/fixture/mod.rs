//! # Environment Fixture
//!
//! Performs the expensive one-time environment setup for a group (schema,
//! base seed data and the optional steps gated by [`EnvironmentConfig`]),
//! the full teardown, and the clearing of process-local caches between tests.

pub mod cache;
pub mod steps;

pub use cache::{CacheRegistry, InMemoryCache, MemoCache};
pub use steps::{SetupStep, SqlStep};

use crate::config::EnvironmentConfig;
use crate::errors::{HarnessError, Result};
use crate::storage::TableStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Environment surface consumed by the lifecycle coordinator
#[async_trait]
pub trait EnvironmentFixture: Send + Sync {
    /// Build the environment for `config`.
    ///
    /// Succeeds without doing anything when already built with the same
    /// configuration. A failure leaves the environment unusable until
    /// [`EnvironmentFixture::teardown`]; it is never retried.
    async fn build(&mut self, config: &EnvironmentConfig) -> Result<()>;

    /// Drop the schema entirely
    async fn teardown(&mut self) -> Result<()>;

    /// Invalidate every known process-local cache. Returns once all caches
    /// relevant to row data are empty.
    fn clear_in_memory_caches(&self) -> Result<()>;

    /// Table access for the built environment
    fn store(&self) -> Arc<dyn TableStore>;

    /// Tables that exist in the built environment
    async fn table_names(&self) -> Result<Vec<String>> {
        self.store().list_tables().await
    }

    /// Per-test preparation run before each restore
    async fn prepare_test(&self) -> Result<()> {
        Ok(())
    }
}

/// Build state of a [`SqlFixture`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureState {
    Empty,
    Built(EnvironmentConfig),
    /// A build failed part-way; only teardown is accepted
    Broken,
}

/// Fixture driven by SQL statements and pluggable setup steps
pub struct SqlFixture {
    store: Arc<dyn TableStore>,
    schema: Vec<String>,
    seed: Vec<String>,
    translations: Option<Arc<dyn SetupStep>>,
    super_user: Option<Arc<dyn SetupStep>>,
    components: Option<Arc<dyn SetupStep>>,
    per_test: Vec<String>,
    caches: CacheRegistry,
    state: FixtureState,
}

impl SqlFixture {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self {
            store,
            schema: Vec::new(),
            seed: Vec::new(),
            translations: None,
            super_user: None,
            components: None,
            per_test: Vec::new(),
            caches: CacheRegistry::new(),
            state: FixtureState::Empty,
        }
    }

    /// Append a schema statement; schema statements run first, in order
    pub fn with_schema<S: Into<String>>(mut self, statement: S) -> Self {
        self.schema.push(statement.into());
        self
    }

    /// Append a base seed statement, run after the schema
    pub fn with_seed<S: Into<String>>(mut self, statement: S) -> Self {
        self.seed.push(statement.into());
        self
    }

    /// Step run when `load_translations` is enabled
    pub fn with_translations(mut self, step: Arc<dyn SetupStep>) -> Self {
        self.translations = Some(step);
        self
    }

    /// Step run when `create_super_user` is enabled
    pub fn with_super_user(mut self, step: Arc<dyn SetupStep>) -> Self {
        self.super_user = Some(step);
        self
    }

    /// Step run when `configure_components` is enabled
    pub fn with_components(mut self, step: Arc<dyn SetupStep>) -> Self {
        self.components = Some(step);
        self
    }

    /// Statement executed before every test, ahead of the restore
    pub fn with_per_test_statement<S: Into<String>>(mut self, statement: S) -> Self {
        self.per_test.push(statement.into());
        self
    }

    /// Register a cache cleared after every test
    pub fn with_cache(mut self, cache: Arc<dyn InMemoryCache>) -> Self {
        self.caches.register(cache);
        self
    }

    pub fn caches(&self) -> &CacheRegistry {
        &self.caches
    }

    pub fn state(&self) -> FixtureState {
        self.state
    }

    /// Steps enabled by `config`, in build order. A step that is enabled but
    /// not registered fails the build before anything runs.
    fn enabled_steps(&self, config: &EnvironmentConfig) -> Result<Vec<Arc<dyn SetupStep>>> {
        let gated = [
            ("load_translations", config.load_translations, &self.translations),
            ("create_super_user", config.create_super_user, &self.super_user),
            ("configure_components", config.configure_components, &self.components),
        ];

        let mut steps = Vec::new();
        for (option, enabled, step) in gated {
            if !enabled {
                continue;
            }
            match step {
                Some(step) => steps.push(Arc::clone(step)),
                None => {
                    return Err(HarnessError::setup(format!(
                        "'{}' is enabled but the fixture has no step registered for it",
                        option
                    )))
                }
            }
        }
        Ok(steps)
    }

    async fn run_build(&self, steps: &[Arc<dyn SetupStep>]) -> Result<()> {
        for (index, statement) in self.schema.iter().enumerate() {
            self.store
                .execute(statement)
                .await
                .map_err(|e| e.with_context(format!("schema statement {}", index + 1)))?;
        }

        for (index, statement) in self.seed.iter().enumerate() {
            self.store
                .execute(statement)
                .await
                .map_err(|e| e.with_context(format!("seed statement {}", index + 1)))?;
        }

        for step in steps {
            step.apply(self.store.as_ref()).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl EnvironmentFixture for SqlFixture {
    async fn build(&mut self, config: &EnvironmentConfig) -> Result<()> {
        match self.state {
            FixtureState::Built(built) if built == *config => {
                debug!("Environment already built with this configuration");
                return Ok(());
            }
            FixtureState::Built(built) => {
                return Err(HarnessError::usage(
                    "build",
                    format!(
                        "environment is built with {:?}; tear it down before building with {:?}",
                        built, config
                    ),
                ));
            }
            FixtureState::Broken => {
                return Err(HarnessError::setup(
                    "a previous build failed; tear the environment down before rebuilding",
                ));
            }
            FixtureState::Empty => {}
        }

        let steps = self.enabled_steps(config)?;

        if let Err(e) = self.run_build(&steps).await {
            error!(error = %e, "Environment build failed");
            self.state = FixtureState::Broken;
            return Err(HarnessError::setup_with_source("environment build failed", Box::new(e)));
        }

        self.state = FixtureState::Built(*config);
        info!(
            schema_statements = self.schema.len(),
            seed_statements = self.seed.len(),
            steps = steps.len(),
            backend = self.store.backend(),
            "Environment built"
        );
        Ok(())
    }

    async fn teardown(&mut self) -> Result<()> {
        let mut tables = self.store.list_tables().await?;
        tables.reverse();
        for table in &tables {
            if let Err(e) = self.store.drop_table(table).await {
                self.state = FixtureState::Broken;
                return Err(e);
            }
        }

        self.caches.clear_all()?;
        self.state = FixtureState::Empty;
        info!(tables = tables.len(), "Environment torn down");
        Ok(())
    }

    fn clear_in_memory_caches(&self) -> Result<()> {
        self.caches.clear_all()
    }

    fn store(&self) -> Arc<dyn TableStore> {
        Arc::clone(&self.store)
    }

    async fn prepare_test(&self) -> Result<()> {
        for statement in &self.per_test {
            self.store
                .execute(statement)
                .await
                .map_err(|e| e.with_context("per-test statement"))?;
        }
        Ok(())
    }
}
