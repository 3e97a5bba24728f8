//! Access to the replica rows of the geodatabase metadata table.
//!
//! Candidates are staged into a session-scoped temporary table and read back
//! over the same connection. [`ReplicaCatalog`] is the seam between the job and
//! the database; [`crate::sql_server::SqlServerCatalog`] is the production
//! implementation.

use async_trait::async_trait;

use crate::errors::Result;

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;

/// `GDB_ITEMS.Type` value of map service replica rows.
pub const REPLICA_TYPE: &str = "5B966567-FB87-4DDE-938B-B4B37423539D";

/// Name of the session-scoped staging table.
pub const STAGING_TABLE: &str = "#TMP_GDB_ITEMS";

/// A replica row read back from the staging table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateReplica {
    /// Replica UUID, as text.
    pub uuid: String,
    /// `DatasetInfo1`, which contains the service URL.
    pub dataset_info: Option<String>,
    /// Replica definition document.
    pub definition: Option<String>,
    /// Item type code.
    pub item_type: String,
}

/// Selects which metadata rows are candidates for retirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFilter {
    /// Database holding `GDB_ITEMS`.
    pub database: String,
    /// Substring that `DatasetInfo1` must contain.
    pub service_url: String,
}

impl CandidateFilter {
    pub fn new(database: impl Into<String>, service_url: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            service_url: service_url.into(),
        }
    }

    /// Whether a metadata row is a candidate, ignoring the batch cap.
    pub fn matches(&self, item_type: &str, dataset_info: Option<&str>) -> bool {
        item_type.eq_ignore_ascii_case(REPLICA_TYPE)
            && dataset_info.is_some_and(|info| info.contains(&self.service_url))
    }
}

/// Query-executor capability over one open database session.
///
/// Staging and retrieval must happen on the same session because the staging
/// table is invisible to every other connection.
#[async_trait]
pub trait ReplicaCatalog: Send {
    /// Replaces the staging table with the first `batch_size` matching rows.
    ///
    /// Drop and repopulate happen in one transaction. Returns the number of
    /// rows staged.
    async fn stage_candidates(&mut self, filter: &CandidateFilter, batch_size: u32) -> Result<u64>;

    /// Reads the staging table back, in the order the database returns it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if nothing was staged on this session.
    async fn fetch_candidates(&mut self) -> Result<Vec<CandidateReplica>>;

    /// Releases the session. Calling it more than once is a no-op.
    async fn close(&mut self) -> Result<()>;
}

/// Quotes a SQL Server identifier with brackets.
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Builds a `LIKE` pattern matching `value` anywhere in a column.
///
/// `%`, `_` and `[` in the value are matched literally.
pub fn contains_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for ch in value.chars() {
        match ch {
            '%' | '_' | '[' => {
                pattern.push('[');
                pattern.push(ch);
                pattern.push(']');
            }
            _ => pattern.push(ch),
        }
    }
    pattern.push('%');
    pattern
}

/// Statements that stage candidates, in execution order.
///
/// The first two run in session scope so the table outlives them. The insert
/// takes `@P1` (batch size) and `@P2` (the `LIKE` pattern).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingStatements {
    pub drop_existing: String,
    pub create_empty: String,
    pub insert_candidates: String,
}

impl StagingStatements {
    pub fn new(database: &str) -> Self {
        let items = format!("{}.[dbo].[GDB_ITEMS]", quote_identifier(database));

        Self {
            drop_existing: format!(
                "IF OBJECT_ID('tempdb..{table}') IS NOT NULL DROP TABLE {table};",
                table = STAGING_TABLE
            ),
            create_empty: format!(
                "SELECT TOP(0) [UUID], [DatasetInfo1], [Definition], [Type] INTO {} FROM {};",
                STAGING_TABLE, items
            ),
            insert_candidates: format!(
                "INSERT INTO {} ([UUID], [DatasetInfo1], [Definition], [Type]) \
                 SELECT TOP(@P1) [UUID], [DatasetInfo1], [Definition], [Type] FROM {} \
                 WHERE [Type] = '{}' AND [DatasetInfo1] LIKE @P2;",
                STAGING_TABLE, items, REPLICA_TYPE
            ),
        }
    }
}

/// Reads the staging table with every column as text.
pub fn fetch_statement() -> String {
    format!(
        "SELECT CONVERT(NVARCHAR(36), [UUID]) AS [UUID], [DatasetInfo1], \
         CONVERT(NVARCHAR(MAX), [Definition]) AS [Definition], \
         CONVERT(NVARCHAR(36), [Type]) AS [Type] FROM {};",
        STAGING_TABLE
    )
}
