//! Database connection string assembly.
//!
//! The job connects to SQL Server with SQL authentication and declares a
//! read-only application intent. The connection string is built here; nothing
//! in this module talks to the database.

use secrecy::{ExposeSecret, SecretString};
use url::form_urlencoded;

use crate::errors::{Error, Result};

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;

/// Driver identifier placed at the front of every connection string.
pub const ODBC_DRIVER: &str = "{ODBC Driver 17 for SQL Server}";

/// Scheme prefix of the engine URL that wraps the encoded connection string.
pub const ENGINE_URL_PREFIX: &str = "mssql+pyodbc:///?odbc_connect=";

const MASKED_PASSWORD: &str = "********";

/// Builds a semicolon-delimited `key=value` connection string.
///
/// The string always disables trusted (integrated) authentication and marks
/// the connection as read-only.
///
/// # Errors
///
/// Returns `Error::InvalidValue` if `server` or `database` is empty.
pub fn build_connection_string(
    server: &str,
    database: &str,
    user: &str,
    password: &str,
) -> Result<String> {
    if server.is_empty() || database.is_empty() {
        return Err(Error::InvalidValue(
            "server and database parameters must be provided".to_string(),
        ));
    }

    let parts = [
        ("DRIVER", ODBC_DRIVER),
        ("Server", server),
        ("Database", database),
        ("UID", user),
        ("PWD", password),
        ("Trusted_Connection", "no"),
        ("applicationintent", "readonly"),
    ];

    Ok(parts
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(";"))
}

/// Percent-encodes a connection string and embeds it into an engine URL.
pub fn engine_url(connection_string: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(connection_string.as_bytes()).collect();
    format!("{}{}", ENGINE_URL_PREFIX, encoded)
}

/// Everything needed to open the job's database connection.
///
/// The password is kept secret; `Debug` output never contains it.
pub struct ConnectionDescriptor {
    server: String,
    database: String,
    user: String,
    password: SecretString,
    trust_server_certificate: bool,
}

impl ConnectionDescriptor {
    /// Creates a descriptor, validating the inputs the same way
    /// [`build_connection_string`] does.
    pub fn new(
        server: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: SecretString,
    ) -> Result<Self> {
        let descriptor = Self {
            server: server.into(),
            database: database.into(),
            user: user.into(),
            password,
            trust_server_certificate: false,
        };
        descriptor.masked_connection_string()?;
        Ok(descriptor)
    }

    /// Accept the server's TLS certificate without validating it.
    pub fn with_trust_server_certificate(mut self, trust: bool) -> Self {
        self.trust_server_certificate = trust;
        self
    }

    pub fn trust_server_certificate(&self) -> bool {
        self.trust_server_certificate
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// The full connection string, including the password.
    pub fn connection_string(&self) -> Result<String> {
        build_connection_string(
            &self.server,
            &self.database,
            &self.user,
            self.password.expose_secret(),
        )
    }

    /// The engine URL with the password masked, for diagnostics.
    pub fn redacted_engine_url(&self) -> Result<String> {
        Ok(engine_url(&self.masked_connection_string()?))
    }

    fn masked_connection_string(&self) -> Result<String> {
        build_connection_string(&self.server, &self.database, &self.user, MASKED_PASSWORD)
    }
}

impl std::fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &MASKED_PASSWORD)
            .field("trust_server_certificate", &self.trust_server_certificate)
            .finish()
    }
}
