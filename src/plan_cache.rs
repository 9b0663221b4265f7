// Plan cache reset
// The cache-clear directive differs by server version; the choice is made once,
// here, from a parsed version rather than scattered through the harness.

use crate::contracts::QueryBackend;
use crate::types::{Namespace, ServerVersion};
use anyhow::{Context, Result};
use mongodb::bson::{doc, Document};

/// First (major, minor) version that accepts the namespaced admin form
pub const NAMESPACED_CLEAR_SINCE: (u32, u32) = (4, 4);

/// A plan cache clear directive for one namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanCacheClear {
    /// `{planCacheClear: "<db>.<coll>"}` sent to `admin` (4.4 and later)
    AdminNamespace { namespace: String },
    /// `{planCacheClear: "<coll>"}` sent to the owning database (before 4.4)
    DatabaseCommand { database: String, collection: String },
}

impl PlanCacheClear {
    /// Pick the directive form for `version`
    pub fn for_version(version: &ServerVersion, namespace: &Namespace) -> Self {
        let (major, minor) = NAMESPACED_CLEAR_SINCE;
        if version.at_least(major, minor) {
            PlanCacheClear::AdminNamespace {
                namespace: namespace.to_string(),
            }
        } else {
            PlanCacheClear::DatabaseCommand {
                database: namespace.database.clone(),
                collection: namespace.collection.clone(),
            }
        }
    }

    /// Database the command is sent to
    pub fn target_database(&self) -> &str {
        match self {
            PlanCacheClear::AdminNamespace { .. } => "admin",
            PlanCacheClear::DatabaseCommand { database, .. } => database,
        }
    }

    pub fn command(&self) -> Document {
        match self {
            PlanCacheClear::AdminNamespace { namespace } => {
                doc! { "planCacheClear": namespace.as_str() }
            }
            PlanCacheClear::DatabaseCommand { collection, .. } => {
                doc! { "planCacheClear": collection.as_str() }
            }
        }
    }

    /// Issue the directive through `backend`
    pub async fn execute<B: QueryBackend>(&self, backend: &B) -> Result<()> {
        backend
            .run_command(self.target_database(), self.command())
            .await
            .with_context(|| format!("planCacheClear on {} failed", self.target_database()))?;
        Ok(())
    }
}

/// Look up the server version and clear the plan cache of `namespace`.
///
/// Returns the directive that was issued.
pub async fn clear_plan_cache<B: QueryBackend>(
    backend: &B,
    namespace: &Namespace,
) -> Result<PlanCacheClear> {
    let version = backend
        .server_version()
        .await
        .context("Failed to determine server version")?;
    let directive = PlanCacheClear::for_version(&version, namespace);
    directive.execute(backend).await?;
    Ok(directive)
}
