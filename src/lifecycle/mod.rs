//! # Lifecycle Coordinator
//!
//! Orchestrates the four hooks a test runner calls for a group of tests that
//! share one environment:
//!
//! ```text
//! before_group ─► [ before_each ─► test body ─► after_each ]* ─► after_group
//!  build + capture    restore                    clear caches     release
//! ```
//!
//! The group context (configuration, snapshot, counters) is created by
//! `before_group`, owned by the coordinator and dropped by `after_group`.
//! Hooks called out of order are rejected as usage errors.
//!
//! A group that follows a finished one tears the previous environment down
//! and builds a fresh one, so rows left by the last test of a group never
//! reach the next group's snapshot.
//!
//! A group whose tests alter table structure must call
//! [`LifecycleCoordinator::rebuild`] before the next test instead of relying
//! on the snapshot restore, or enable `rebuild_each_test`.

pub mod state;

pub use state::{Hook, LifecycleState};

use crate::config::{EnvironmentConfig, LifecycleConfig};
use crate::errors::{HarnessError, Result};
use crate::fixture::EnvironmentFixture;
use crate::harness_span;
use crate::snapshot::{SnapshotStore, TableSnapshot};
use crate::storage::TableStore;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Why a test run through [`LifecycleCoordinator::run_test`] failed
#[derive(Debug, thiserror::Error)]
pub enum TestFailure<E> {
    /// Per-test setup failed; the body did not run
    #[error("test setup failed: {0}")]
    Setup(#[source] HarnessError),

    /// The test body itself failed
    #[error("test failed: {0}")]
    Body(E),

    /// The body passed but caches could not be cleared afterwards
    #[error("test teardown failed: {0}")]
    Teardown(#[source] HarnessError),
}

impl<E> TestFailure<E> {
    pub fn is_setup(&self) -> bool {
        matches!(self, TestFailure::Setup(_))
    }

    pub fn is_body(&self) -> bool {
        matches!(self, TestFailure::Body(_))
    }

    /// The harness error behind a setup or teardown failure
    pub fn harness_error(&self) -> Option<&HarnessError> {
        match self {
            TestFailure::Setup(e) | TestFailure::Teardown(e) => Some(e),
            TestFailure::Body(_) => None,
        }
    }
}

/// Result of a test body run through the coordinator
pub type TestResult<T> = std::result::Result<T, TestFailure<anyhow::Error>>;

/// State shared by the tests of one group
struct GroupContext {
    id: Uuid,
    config: EnvironmentConfig,
    snapshots: SnapshotStore,
    tests_run: usize,
    tainted: bool,
}

/// Drives an [`EnvironmentFixture`] and its snapshot through a test group
pub struct LifecycleCoordinator<F: EnvironmentFixture> {
    fixture: F,
    options: LifecycleConfig,
    state: LifecycleState,
    group: Option<GroupContext>,
}

impl<F: EnvironmentFixture> LifecycleCoordinator<F> {
    pub fn new(fixture: F) -> Self {
        Self::with_options(fixture, LifecycleConfig::default())
    }

    pub fn with_options(fixture: F, options: LifecycleConfig) -> Self {
        Self { fixture, options, state: LifecycleState::Unbuilt, group: None }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn options(&self) -> &LifecycleConfig {
        &self.options
    }

    /// Configuration of the running group
    pub fn config(&self) -> Option<&EnvironmentConfig> {
        self.group.as_ref().map(|group| &group.config)
    }

    /// Snapshot of the running group
    pub fn snapshot(&self) -> Option<Arc<TableSnapshot>> {
        self.group.as_ref().and_then(|group| group.snapshots.snapshot().cloned())
    }

    pub fn group_id(&self) -> Option<Uuid> {
        self.group.as_ref().map(|group| group.id)
    }

    /// Number of tests set up in the running group
    pub fn tests_run(&self) -> usize {
        self.group.as_ref().map_or(0, |group| group.tests_run)
    }

    /// Whether a failed restore left the environment untrustworthy
    pub fn is_tainted(&self) -> bool {
        self.group.as_ref().is_some_and(|group| group.tainted)
    }

    pub fn fixture(&self) -> &F {
        &self.fixture
    }

    /// Table access for test bodies
    pub fn store(&self) -> Arc<dyn TableStore> {
        self.fixture.store()
    }

    /// Build the environment once for the group and capture its snapshot.
    ///
    /// A build or capture failure aborts the group: no test may run against
    /// a partially built schema. After a finished group the previous
    /// environment is torn down first.
    pub async fn before_group(&mut self, config: EnvironmentConfig) -> Result<()> {
        self.state.check(Hook::BeforeGroup)?;
        let id = Uuid::new_v4();
        let span = harness_span!(Hook::BeforeGroup, group_id = id);
        self.open_group(id, config).instrument(span).await
    }

    /// Restore every table from the group's snapshot.
    ///
    /// A no-op while no snapshot has been captured. A failed restore fails
    /// the current test and taints the group until [`Self::rebuild`].
    pub async fn before_each(&mut self) -> Result<()> {
        self.state.check(Hook::BeforeEach)?;
        let span = self.span(Hook::BeforeEach);
        self.prepare_and_restore().instrument(span).await
    }

    /// Clear process-local caches so the next test cannot observe values
    /// computed under this test's rows
    pub fn after_each(&mut self) -> Result<()> {
        self.state.check(Hook::AfterEach)?;
        let _entered = self.span(Hook::AfterEach).entered();

        self.fixture.clear_in_memory_caches().map_err(|e| {
            if matches!(e, HarnessError::CacheFailure { .. }) {
                e
            } else {
                HarnessError::cache("fixture", e.to_string())
            }
        })
    }

    /// Discard the group's snapshot. The schema stays in place until the
    /// next `before_group` or [`Self::teardown`].
    pub fn after_group(&mut self) -> Result<()> {
        self.state.check(Hook::AfterGroup)?;
        let _entered = self.span(Hook::AfterGroup).entered();

        if let Some(mut group) = self.group.take() {
            group.snapshots.release();
            info!(tests_run = group.tests_run, "Group finished");
        }
        self.state = LifecycleState::Released;
        Ok(())
    }

    /// Tear the environment down, build it again with the group's
    /// configuration and capture a fresh snapshot. Required after a test
    /// alters table structure, and to recover from a failed restore.
    pub async fn rebuild(&mut self) -> Result<()> {
        self.state.check(Hook::Rebuild)?;
        let span = self.span(Hook::Rebuild);
        self.rebuild_group().instrument(span).await
    }

    /// Release any snapshot and drop the schema, returning to `Unbuilt`
    pub async fn teardown(&mut self) -> Result<()> {
        if let Some(mut group) = self.group.take() {
            group.snapshots.release();
        }
        self.state = LifecycleState::Unbuilt;
        self.fixture.teardown().await
    }

    /// Run one test: `before_each`, then `body`, then `after_each`.
    ///
    /// The body is skipped when setup fails. Caches are cleared even when the
    /// body fails; the body's error wins over a teardown error.
    pub async fn run_test<T, E, B, Fut>(&mut self, body: B) -> std::result::Result<T, TestFailure<E>>
    where
        B: FnOnce(Arc<dyn TableStore>) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Err(e) = self.before_each().await {
            error!(error = %e, severity = %e.severity(), "Test setup failed, skipping body");
            return Err(TestFailure::Setup(e));
        }

        let outcome = body(self.fixture.store()).await;
        let cleared = self.after_each();

        match (outcome, cleared) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(TestFailure::Teardown(e)),
            (Err(e), cleared) => {
                if let Err(cache_error) = cleared {
                    error!(error = %cache_error, "Cache clearing failed after a failing test");
                }
                Err(TestFailure::Body(e))
            }
        }
    }

    fn span(&self, hook: Hook) -> tracing::Span {
        match self.group_id() {
            Some(id) => harness_span!(hook, group_id = id),
            None => harness_span!(hook),
        }
    }

    async fn start_group(&mut self, id: Uuid, config: EnvironmentConfig, tests_run: usize) -> Result<()> {
        if let Err(e) = self.fixture.build(&config).await {
            self.state = LifecycleState::Unbuilt;
            error!(error = %e, "Environment build failed, aborting group");
            return Err(if e.is_setup_failure() || e.is_usage() {
                e
            } else {
                HarnessError::setup_with_source("environment build failed", Box::new(e))
            });
        }

        self.state = LifecycleState::Built;
        let snapshots = SnapshotStore::new(self.fixture.store())
            .with_drift_detection(self.options.detect_structural_drift);
        let group = self.group.insert(GroupContext { id, config, snapshots, tests_run, tainted: false });

        let captured = match self.fixture.table_names().await {
            Ok(tables) => group.snapshots.capture(&tables).await,
            Err(e) => Err(e),
        };

        match captured {
            Ok(snapshot) => {
                self.state = LifecycleState::SnapshotReady;
                info!(
                    tables = snapshot.table_count(),
                    rows = snapshot.row_count(),
                    load_translations = config.load_translations,
                    create_super_user = config.create_super_user,
                    configure_components = config.configure_components,
                    "Group environment ready"
                );
                Ok(())
            }
            Err(e) => {
                self.group = None;
                self.state = LifecycleState::Unbuilt;
                error!(error = %e, "Snapshot capture failed, aborting group");
                Err(HarnessError::setup_with_source("snapshot capture failed", Box::new(e)))
            }
        }
    }

    async fn open_group(&mut self, id: Uuid, config: EnvironmentConfig) -> Result<()> {
        if self.state == LifecycleState::Released {
            self.state = LifecycleState::Unbuilt;
            self.fixture.teardown().await.map_err(|e| {
                HarnessError::setup_with_source(
                    "teardown of the previous group's environment failed",
                    Box::new(e),
                )
            })?;
            debug!("Previous group environment torn down");
        }
        self.start_group(id, config, 0).await
    }

    async fn rebuild_group(&mut self) -> Result<()> {
        let Some(mut group) = self.group.take() else {
            return Err(HarnessError::usage(Hook::Rebuild.to_string(), "no group is running"));
        };
        group.snapshots.release();
        self.state = LifecycleState::Unbuilt;

        self.fixture.teardown().await.map_err(|e| {
            HarnessError::setup_with_source("environment teardown before rebuild failed", Box::new(e))
        })?;

        info!(tests_run = group.tests_run, "Rebuilding group environment");
        self.start_group(group.id, group.config, group.tests_run).await
    }

    async fn prepare_and_restore(&mut self) -> Result<()> {
        if self.is_tainted() {
            return Err(HarnessError::usage(
                Hook::BeforeEach.to_string(),
                "a previous restore failed and the environment is untrustworthy; call rebuild()",
            ));
        }

        if self.options.rebuild_each_test {
            self.rebuild_group().await?;
            self.fixture.prepare_test().await.map_err(|e| e.with_context("per-test preparation"))?;
        } else if self.state == LifecycleState::SnapshotReady {
            self.fixture.prepare_test().await.map_err(|e| e.with_context("per-test preparation"))?;
            self.restore().await?;
        } else {
            debug!("No snapshot captured yet, nothing to restore");
        }

        if let Some(group) = self.group.as_mut() {
            group.tests_run += 1;
        }
        Ok(())
    }

    async fn restore(&mut self) -> Result<()> {
        let Some(group) = self.group.as_mut() else {
            return Err(HarnessError::usage(Hook::BeforeEach.to_string(), "no group is running"));
        };

        match group.snapshots.restore().await {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.is_restore_failure() {
                    group.tainted = true;
                    warn!(error = %e, "Restore failed; rebuild the environment before the next test");
                }
                Err(e)
            }
        }
    }
}
