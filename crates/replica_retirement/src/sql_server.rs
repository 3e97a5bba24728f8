//! SQL Server implementation of [`ReplicaCatalog`].
//!
//! Holds exactly one TDS connection for its whole lifetime. The staging table
//! is connection-scoped, so staging and retrieval must both go through the
//! same `SqlServerCatalog`.

use async_trait::async_trait;
use tiberius::{Client, Config, Row, SqlBrowser, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, instrument, warn};

use crate::catalog::{
    contains_pattern, fetch_statement, CandidateFilter, CandidateReplica, ReplicaCatalog,
    StagingStatements,
};
use crate::connection::ConnectionDescriptor;
use crate::errors::{Error, Result};

#[cfg(test)]
#[path = "sql_server_tests.rs"]
mod tests;

const BEGIN_TRANSACTION: &str = "BEGIN TRANSACTION;";
const COMMIT_TRANSACTION: &str = "COMMIT TRANSACTION;";
const ROLLBACK_TRANSACTION: &str = "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION;";

type SqlClient = Client<Compat<TcpStream>>;

/// A single open session against the database holding `GDB_ITEMS`.
pub struct SqlServerCatalog {
    client: Option<SqlClient>,
}

impl SqlServerCatalog {
    /// Opens the session described by `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the connection string is rejected by the
    /// driver, the server cannot be reached, or login fails.
    #[instrument(skip(descriptor), fields(server = %descriptor.server(), database = %descriptor.database()))]
    pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        debug!(
            url = %descriptor.redacted_engine_url()?,
            "Opening database connection"
        );

        let config = driver_config(descriptor)?;

        let tcp = TcpStream::connect_named(&config).await.map_err(|e| {
            Error::Database(format!(
                "Failed to connect to {}: {}",
                descriptor.server(),
                e
            ))
        })?;
        tcp.set_nodelay(true).map_err(|e| {
            Error::Database(format!("Failed to configure database socket: {}", e))
        })?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(database_error("Failed to open database session"))?;

        info!("Database connection opened");
        Ok(Self {
            client: Some(client),
        })
    }

    fn client(&mut self) -> Result<&mut SqlClient> {
        self.client
            .as_mut()
            .ok_or_else(|| Error::Database("database connection is closed".to_string()))
    }
}

#[async_trait]
impl ReplicaCatalog for SqlServerCatalog {
    #[instrument(skip(self, filter), fields(database = %filter.database))]
    async fn stage_candidates(&mut self, filter: &CandidateFilter, batch_size: u32) -> Result<u64> {
        let statements = StagingStatements::new(&filter.database);
        let pattern = contains_pattern(&filter.service_url);
        let client = self.client()?;

        run_batch(client, BEGIN_TRANSACTION).await?;

        let outcome = stage_in_transaction(client, &statements, batch_size, &pattern).await;
        let staged = finish_transaction(client, outcome).await?;
        debug!(staged = staged, "Staging transaction committed");
        Ok(staged)
    }

    #[instrument(skip(self))]
    async fn fetch_candidates(&mut self) -> Result<Vec<CandidateReplica>> {
        let client = self.client()?;

        let rows = client
            .simple_query(fetch_statement())
            .await
            .map_err(database_error("Failed to read staged replicas"))?
            .into_first_result()
            .await
            .map_err(database_error("Failed to read staged replicas"))?;

        rows.iter().map(candidate_from_row).collect()
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client
                .close()
                .await
                .map_err(database_error("Failed to close database connection"))?;
            debug!("Database connection closed");
        }
        Ok(())
    }
}

/// Driver configuration for `descriptor`.
///
/// The key/value string carries the read-only intent, but the driver only
/// honours it when set explicitly.
fn driver_config(descriptor: &ConnectionDescriptor) -> Result<Config> {
    let mut config = Config::from_ado_string(&descriptor.connection_string()?)
        .map_err(database_error("Invalid connection string"))?;
    config.readonly(true);
    if descriptor.trust_server_certificate() {
        config.trust_cert();
    }
    Ok(config)
}

/// Session-scoped statement execution.
#[async_trait]
trait BatchExecutor: Send {
    async fn execute_batch(&mut self, sql: &str) -> Result<()>;
}

#[async_trait]
impl BatchExecutor for SqlClient {
    async fn execute_batch(&mut self, sql: &str) -> Result<()> {
        run_batch(self, sql).await
    }
}

/// Commits a successful staging outcome, rolling back when either the
/// staging or the commit failed. The first error is returned.
async fn finish_transaction<S>(session: &mut S, outcome: Result<u64>) -> Result<u64>
where
    S: BatchExecutor + ?Sized,
{
    let outcome = match outcome {
        Ok(staged) => session
            .execute_batch(COMMIT_TRANSACTION)
            .await
            .map(|()| staged),
        Err(err) => Err(err),
    };

    if outcome.is_err() {
        if let Err(rollback_err) = session.execute_batch(ROLLBACK_TRANSACTION).await {
            warn!(error = %rollback_err, "Failed to roll back staging transaction");
        }
    }
    outcome
}

async fn stage_in_transaction(
    client: &mut SqlClient,
    statements: &StagingStatements,
    batch_size: u32,
    pattern: &str,
) -> Result<u64> {
    run_batch(client, &statements.drop_existing).await?;
    run_batch(client, &statements.create_empty).await?;

    let batch_size = i64::from(batch_size);
    let pattern = pattern.to_string();
    let params: [&dyn ToSql; 2] = [&batch_size, &pattern];
    let result = client
        .execute(statements.insert_candidates.as_str(), &params)
        .await
        .map_err(database_error("Failed to stage replicas"))?;

    Ok(result.total())
}

/// Runs statements in session scope, discarding any result sets.
async fn run_batch(client: &mut SqlClient, sql: &str) -> Result<()> {
    debug!(sql = sql, "Executing statement");
    client
        .simple_query(sql)
        .await
        .map_err(database_error("Statement failed"))?
        .into_results()
        .await
        .map_err(database_error("Statement failed"))?;
    Ok(())
}

fn candidate_from_row(row: &Row) -> Result<CandidateReplica> {
    let uuid = text_column(row, "UUID")?
        .ok_or_else(|| Error::Database("Staged replica has no UUID".to_string()))?;

    Ok(CandidateReplica {
        uuid,
        dataset_info: text_column(row, "DatasetInfo1")?,
        definition: text_column(row, "Definition")?,
        item_type: text_column(row, "Type")?.unwrap_or_default(),
    })
}

fn text_column(row: &Row, column: &str) -> Result<Option<String>> {
    row.try_get::<&str, _>(column)
        .map(|value| value.map(str::to_string))
        .map_err(|e| Error::Database(format!("Failed to read column {}: {}", column, e)))
}

fn database_error(context: &'static str) -> impl Fn(tiberius::error::Error) -> Error {
    move |e| Error::Database(format!("{}: {}", context, e))
}
