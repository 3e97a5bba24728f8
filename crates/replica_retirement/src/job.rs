//! Replica retirement workflow.
//!
//! A run stages a batch of candidates, reads them back, unregisters each one
//! and reports the identifiers it retired. Each step takes its inputs as
//! parameters and returns its outputs so the pipeline can be driven piecewise.

use std::fmt;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::administration::ReplicaAdministrator;
use crate::catalog::{CandidateFilter, CandidateReplica, ReplicaCatalog};
use crate::errors::Result;
use crate::settings::JobSettings;

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;

/// Identifiers retired by a run, in the order they were processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetirementReport {
    replica_ids: Vec<String>,
}

impl RetirementReport {
    pub fn new(replica_ids: Vec<String>) -> Self {
        Self { replica_ids }
    }

    pub fn replica_ids(&self) -> &[String] {
        &self.replica_ids
    }

    pub fn len(&self) -> usize {
        self.replica_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replica_ids.is_empty()
    }
}

/// Formats as a comma-joined list of single-quoted identifiers, e.g.
/// `'id-1','id-2'`. An empty report formats as an empty string.
impl fmt::Display for RetirementReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.replica_ids.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "'{}'", id)?;
        }
        Ok(())
    }
}

/// Stages up to `batch_size` candidates on the catalog's session.
pub async fn stage_candidates<C>(
    catalog: &mut C,
    filter: &CandidateFilter,
    batch_size: u32,
) -> Result<u64>
where
    C: ReplicaCatalog + ?Sized,
{
    info!(
        database = %filter.database,
        service_url = %filter.service_url,
        batch_size = batch_size,
        "Staging replicas for retirement"
    );

    let staged = catalog.stage_candidates(filter, batch_size).await?;

    info!(staged = staged, "Replicas staged");
    Ok(staged)
}

/// Reads the staged candidates back from the catalog's session.
pub async fn fetch_candidates<C>(catalog: &mut C) -> Result<Vec<CandidateReplica>>
where
    C: ReplicaCatalog + ?Sized,
{
    let candidates = catalog.fetch_candidates().await?;
    debug!(count = candidates.len(), "Fetched staged replicas");
    Ok(candidates)
}

/// Unregisters every candidate, one at a time, in order.
///
/// Stops at the first failure. Replicas unregistered before that stay
/// unregistered and are not reported.
pub async fn unregister_all<A>(
    administrator: &A,
    destination: &Path,
    candidates: &[CandidateReplica],
) -> Result<RetirementReport>
where
    A: ReplicaAdministrator + ?Sized,
{
    let mut retired = Vec::with_capacity(candidates.len());

    for (index, candidate) in candidates.iter().enumerate() {
        debug!(
            replica_id = %candidate.uuid,
            position = index + 1,
            total = candidates.len(),
            "Unregistering replica"
        );
        administrator
            .unregister_replica(destination, &candidate.uuid)
            .await?;
        retired.push(candidate.uuid.clone());
    }

    Ok(RetirementReport::new(retired))
}

/// One configured retirement run.
pub struct RetirementJob<'a> {
    settings: &'a JobSettings,
    dry_run: bool,
}

impl<'a> RetirementJob<'a> {
    pub fn new(settings: &'a JobSettings) -> Self {
        Self {
            settings,
            dry_run: false,
        }
    }

    /// Stage and list candidates without unregistering them.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn filter(&self) -> CandidateFilter {
        CandidateFilter::new(
            self.settings.connection.database(),
            self.settings.service_url.as_str(),
        )
    }

    /// Runs staging, retrieval and unregistration on one catalog session.
    ///
    /// The session is closed before returning, whether or not the run
    /// succeeded. When both the run and the close fail, the run's error is
    /// returned.
    pub async fn run<C, A>(&self, catalog: &mut C, administrator: &A) -> Result<RetirementReport>
    where
        C: ReplicaCatalog + ?Sized,
        A: ReplicaAdministrator + ?Sized,
    {
        info!(
            environment = %self.settings.environment,
            source_geodatabase = %self.settings.source_geodatabase.display(),
            destination = %self.settings.destination_sde.display(),
            "Starting replica retirement"
        );

        let outcome = self.run_pipeline(catalog, administrator).await;
        let closed = catalog.close().await;

        let report = outcome?;
        closed?;

        info!(retired = report.len(), "Replica retirement completed");
        Ok(report)
    }

    async fn run_pipeline<C, A>(
        &self,
        catalog: &mut C,
        administrator: &A,
    ) -> Result<RetirementReport>
    where
        C: ReplicaCatalog + ?Sized,
        A: ReplicaAdministrator + ?Sized,
    {
        stage_candidates(catalog, &self.filter(), self.settings.replica_count).await?;
        let candidates = fetch_candidates(catalog).await?;

        if self.dry_run {
            warn!(
                count = candidates.len(),
                "Dry run: staged replicas were not unregistered"
            );
            return Ok(RetirementReport::new(
                candidates.into_iter().map(|c| c.uuid).collect(),
            ));
        }

        unregister_all(administrator, &self.settings.destination_sde, &candidates).await
    }
}
