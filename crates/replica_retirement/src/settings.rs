//! Settings loading for the replica retirement job.
//!
//! Settings live in a TOML file with one section per environment plus a
//! `[Default]` section and an optional `[WhichGeodatabase]` selector:
//!
//! ```toml
//! [WhichGeodatabase]
//! qaOrProd = "QA"
//!
//! [Default]
//! replicaCount = "25"
//!
//! [QA]
//! sqlConnServer = "sqlqa01.example.local"
//! sqlConnDatabase = "GISQA"
//! sqlConnUser = "gis_reader"
//! sqlConnPwid = "change-me"
//! serviceUrl = "MapServer/FeatureServer"
//! destinationSde = "resources/QA/replicaAdmin_QA.sde"
//! trustServerCertificate = false  # optional
//! ```
//!
//! Paths are resolved against a base directory, which the command line sets
//! to the current working directory.

use std::{
    fs,
    path::{Path, PathBuf},
};

use secrecy::SecretString;
use serde::Deserialize;
use tracing::debug;

use crate::connection::ConnectionDescriptor;
use crate::errors::{Error, Result};

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;

/// Default settings file name, looked up in the working directory.
pub const DEFAULT_SETTINGS_FILENAME: &str = "UnregisterGdbReplicas.toml";

/// Environment used when the settings file does not select one.
pub const DEFAULT_ENVIRONMENT: &str = "QA";

/// Interpreter used to reach the geodatabase administration API when the
/// settings file does not name one.
pub const DEFAULT_ARCPY_PYTHON: &str = "python";

const SELECTOR_SECTION: &str = "WhichGeodatabase";
const SELECTOR_KEY: &str = "qaOrProd";
const DEFAULT_SECTION: &str = "Default";

/// Values supplied on the command line that take precedence over the file.
#[derive(Debug, Default, Clone)]
pub struct SettingsOverrides {
    pub environment: Option<String>,
    pub replica_count: Option<u32>,
}

/// Fully resolved settings for one job run.
///
/// Built once before the job starts and never modified afterwards.
#[derive(Debug)]
pub struct JobSettings {
    /// Selected environment, e.g. `QA` or `PROD`.
    pub environment: String,

    /// Connection file of the geodatabase holding the replicas.
    pub source_geodatabase: PathBuf,

    /// Connection to the database holding `GDB_ITEMS`.
    pub connection: ConnectionDescriptor,

    /// Substring of `DatasetInfo1` identifying the service's replicas.
    pub service_url: String,

    /// Administrative connection file used for the unregister calls.
    pub destination_sde: PathBuf,

    /// Number of replicas retired per run.
    pub replica_count: u32,

    /// Python interpreter that provides `arcpy`.
    pub arcpy_python: PathBuf,
}

impl JobSettings {
    /// Loads settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file cannot be read or parsed, or if a
    /// required setting is missing. Returns `Error::InvalidValue` if the
    /// database server or name is empty.
    pub fn load(path: &Path, base_dir: &Path, overrides: &SettingsOverrides) -> Result<Self> {
        debug!("Loading settings from {:?}", path);

        if !path.exists() {
            return Err(Error::Config(format!("Settings file not found: {:?}", path)));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read settings file: {}", e)))?;

        Self::from_toml_str(&content, base_dir, overrides)
    }

    /// Resolves settings from TOML text.
    pub fn from_toml_str(
        content: &str,
        base_dir: &Path,
        overrides: &SettingsOverrides,
    ) -> Result<Self> {
        let source = SettingsSource::parse(content)?;

        let environment = match &overrides.environment {
            Some(environment) => environment.clone(),
            None => source
                .optional(SELECTOR_SECTION, SELECTOR_KEY)?
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
        };
        debug!(environment = %environment, "Resolved settings environment");

        let connection = ConnectionDescriptor::new(
            source.required(&environment, "sqlConnServer")?,
            source.required(&environment, "sqlConnDatabase")?,
            source.required(&environment, "sqlConnUser")?,
            SecretString::from(source.required(&environment, "sqlConnPwid")?),
        )?
        .with_trust_server_certificate(
            source
                .optional_bool(&environment, "trustServerCertificate")?
                .unwrap_or(false),
        );

        let service_url = source.required(&environment, "serviceUrl")?;
        let destination_sde = base_dir.join(source.required(&environment, "destinationSde")?);

        let replica_count = match overrides.replica_count {
            Some(count) => count,
            None => source.replica_count()?,
        };

        let arcpy_python = source
            .optional(DEFAULT_SECTION, "arcpyPython")?
            .unwrap_or_else(|| DEFAULT_ARCPY_PYTHON.to_string());

        Ok(Self {
            source_geodatabase: source_geodatabase_path(base_dir, &environment),
            environment,
            connection,
            service_url,
            destination_sde,
            replica_count,
            arcpy_python: PathBuf::from(arcpy_python),
        })
    }
}

/// Path of the source geodatabase connection file for an environment.
///
/// The files follow the `resources/<ENV>/gdbWithReplicas_<ENV>.sde` layout.
pub fn source_geodatabase_path(base_dir: &Path, environment: &str) -> PathBuf {
    base_dir
        .join("resources")
        .join(environment)
        .join(format!("gdbWithReplicas_{}.sde", environment))
}

/// Resolves the path to the settings file.
///
/// Uses `settings_path` when given, otherwise the default file name inside
/// `base_dir`.
pub fn get_settings_path(settings_path: Option<&Path>, base_dir: &Path) -> PathBuf {
    match settings_path {
        Some(path) => base_dir.join(path),
        None => base_dir.join(DEFAULT_SETTINGS_FILENAME),
    }
}

/// The replica count may be written as a number or as text.
#[derive(Deserialize)]
#[serde(untagged)]
enum CountSetting {
    Number(i64),
    Text(String),
}

/// Raw TOML tables with section/key lookups that name what is missing.
struct SettingsSource {
    table: toml::Table,
}

impl SettingsSource {
    fn parse(content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse settings file: {}", e)))?;
        Ok(Self { table })
    }

    fn value(&self, section: &str, key: &str) -> Result<Option<&toml::Value>> {
        match self.table.get(section) {
            None => Ok(None),
            Some(toml::Value::Table(entries)) => Ok(entries.get(key)),
            Some(_) => Err(Error::Config(format!("[{}] must be a section", section))),
        }
    }

    fn optional(&self, section: &str, key: &str) -> Result<Option<String>> {
        match self.value(section, key)? {
            None => Ok(None),
            Some(toml::Value::String(value)) => Ok(Some(value.clone())),
            Some(_) => Err(Error::Config(format!(
                "Setting '{}' in section [{}] must be a string",
                key, section
            ))),
        }
    }

    fn optional_bool(&self, section: &str, key: &str) -> Result<Option<bool>> {
        match self.value(section, key)? {
            None => Ok(None),
            Some(toml::Value::Boolean(value)) => Ok(Some(*value)),
            Some(_) => Err(Error::Config(format!(
                "Setting '{}' in section [{}] must be true or false",
                key, section
            ))),
        }
    }

    fn required(&self, section: &str, key: &str) -> Result<String> {
        self.optional(section, key)?.ok_or_else(|| {
            Error::Config(format!(
                "Missing required setting '{}' in section [{}]",
                key, section
            ))
        })
    }

    fn replica_count(&self) -> Result<u32> {
        let raw = self
            .value(DEFAULT_SECTION, "replicaCount")?
            .ok_or_else(|| {
                Error::Config(format!(
                    "Missing required setting 'replicaCount' in section [{}]",
                    DEFAULT_SECTION
                ))
            })?
            .clone();

        let invalid = |shown: &dyn std::fmt::Display| {
            Error::Config(format!(
                "replicaCount must be a non-negative integer, got '{}'",
                shown
            ))
        };

        match raw.clone().try_into::<CountSetting>() {
            Ok(CountSetting::Number(count)) => u32::try_from(count).map_err(|_| invalid(&count)),
            Ok(CountSetting::Text(text)) => text.trim().parse::<u32>().map_err(|_| invalid(&text)),
            Err(_) => Err(invalid(&raw)),
        }
    }
}
