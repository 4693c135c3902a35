//! Optional environment build steps (translations, super-user, components).

use crate::errors::Result;
use crate::storage::TableStore;
use async_trait::async_trait;

/// One optional, expensive part of an environment build
#[async_trait]
pub trait SetupStep: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Apply the step against the freshly built schema
    async fn apply(&self, store: &dyn TableStore) -> Result<()>;
}

/// A step made of SQL statements executed in order
#[derive(Debug, Clone)]
pub struct SqlStep {
    name: String,
    statements: Vec<String>,
}

impl SqlStep {
    pub fn new<N, I, S>(name: N, statements: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { name: name.into(), statements: statements.into_iter().map(Into::into).collect() }
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

#[async_trait]
impl SetupStep for SqlStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, store: &dyn TableStore) -> Result<()> {
        for (index, statement) in self.statements.iter().enumerate() {
            store.execute(statement).await.map_err(|e| {
                e.with_context(format!("step '{}' statement {}", self.name, index + 1))
            })?;
        }
        tracing::debug!(step = %self.name, statements = self.statements.len(), "Setup step applied");
        Ok(())
    }
}
