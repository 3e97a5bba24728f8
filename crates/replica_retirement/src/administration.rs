//! Geodatabase replica administration.
//!
//! Unregistering a replica is only exposed through the ArcGIS `arcpy`
//! geoprocessing API, so the production administrator drives a Python
//! interpreter that has `arcpy` installed.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info, instrument};

use crate::errors::{Error, Result};

#[cfg(test)]
#[path = "administration_tests.rs"]
mod tests;

/// Script passed to the interpreter. Receives the connection file and the
/// replica identifier as its two arguments.
pub const UNREGISTER_SCRIPT: &str =
    "import sys, arcpy; arcpy.management.UnregisterReplica(sys.argv[1], sys.argv[2])";

/// Unregister-operation capability.
#[async_trait]
pub trait ReplicaAdministrator: Send + Sync {
    /// Unregisters one replica from the geodatabase addressed by `destination`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Administration` if the identifier is unknown or the
    /// geodatabase cannot be reached.
    async fn unregister_replica(&self, destination: &Path, replica_id: &str) -> Result<()>;
}

/// Unregisters replicas by running `arcpy` in a child Python process.
#[derive(Debug, Clone)]
pub struct ArcpyAdministrator {
    python: PathBuf,
}

impl ArcpyAdministrator {
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
        }
    }

    pub fn python(&self) -> &Path {
        &self.python
    }
}

#[async_trait]
impl ReplicaAdministrator for ArcpyAdministrator {
    #[instrument(skip(self, destination), fields(destination = %destination.display()))]
    async fn unregister_replica(&self, destination: &Path, replica_id: &str) -> Result<()> {
        debug!(python = %self.python.display(), "Launching arcpy");

        let output = Command::new(&self.python)
            .arg("-c")
            .arg(UNREGISTER_SCRIPT)
            .arg(destination)
            .arg(replica_id)
            .output()
            .await
            .map_err(|e| Error::Administration {
                replica_id: replica_id.to_string(),
                message: format!("failed to launch {}: {}", self.python.display(), e),
            })?;

        if output.status.success() {
            info!(replica_id = replica_id, "Replica unregistered");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("arcpy exited with {}", output.status)
        } else {
            stderr
        };

        error!(
            replica_id = replica_id,
            status = %output.status,
            "UnregisterReplica failed"
        );
        Err(Error::Administration {
            replica_id: replica_id.to_string(),
            message,
        })
    }
}
