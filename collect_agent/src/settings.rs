use std::fs::{create_dir_all, File};
use std::io::{prelude::*, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shellexpand::tilde;

use crate::{
    error::Error,
    identity::{JobIdentity, JOB_INSTANCE_ID_ENV, JOB_NAME_ENV, SCENARIO_INSTANCE_ID_ENV},
    internal_prelude::*,
    setting_defaults::*,
};

/// The environment variable that can be set to overwrite the config path.
pub const COLLECT_AGENT_CONFIG_PATH_ENV: &str = "COLLECT_AGENT_CONFIG_PATH";

/// Name of the configuration file inside the configuration directories.
pub const CONFIG_FILE_NAME: &str = "collect_agent.yml";

/// Where and how to reach the relay.
#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
pub struct Relay {
    /// The hostname/ip address of the relay. The port is always [crate::RELAY_PORT].
    #[serde(default = "default_host")]
    pub host: String,
    /// How long to wait for the relay's answer, in milliseconds.
    /// Without a value, calls block until the relay answers.
    #[serde(default)]
    pub reply_timeout_ms: Option<u64>,
}

impl Default for Relay {
    fn default() -> Self {
        Relay {
            host: default_host(),
            reply_timeout_ms: None,
        }
    }
}

impl Relay {
    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_ms.map(Duration::from_millis)
    }
}

/// Explicit job identifiers.
/// Each field that is left empty is taken from the environment instead.
#[derive(PartialEq, Eq, Clone, Debug, Default, Deserialize, Serialize)]
pub struct Job {
    pub job_name: Option<String>,
    pub job_instance_id: Option<String>,
    pub scenario_instance_id: Option<String>,
}

/// The parent settings struct. \
/// This contains all other setting structs.
#[derive(PartialEq, Eq, Clone, Default, Debug, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "Default::default")]
    pub relay: Relay,
    #[serde(default = "Default::default")]
    pub job: Job,
}

pub fn default_configuration_directory() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("collect_agent"))
}

/// Get the default config directories.
/// The current directory is always checked last.
pub fn configuration_directories() -> Vec<PathBuf> {
    if let Some(config_dir) = default_configuration_directory() {
        vec![config_dir, PathBuf::from(".")]
    } else {
        vec![PathBuf::from(".")]
    }
}

/// Little helper which expands a given path's `~` characters to a fully qualified path.
pub fn expand_home(old_path: &Path) -> PathBuf {
    PathBuf::from(tilde(&old_path.to_string_lossy()).into_owned())
}

impl Settings {
    /// Try to read existing config files, while using default values for non-existing fields.
    /// If successful, this will return a full config as well as a boolean on whether we found an
    /// existing configuration file or not.
    pub fn read(from_file: &Option<PathBuf>) -> Result<(Settings, bool), Error> {
        // If no explicit path is provided, we look for the COLLECT_AGENT_CONFIG_PATH env variable.
        let from_file = from_file.clone().or_else(|| {
            std::env::var(COLLECT_AGENT_CONFIG_PATH_ENV)
                .map(PathBuf::from)
                .ok()
        });

        if let Some(path) = &from_file {
            let path = expand_home(path);
            return Ok((Self::read_file(&path)?, true));
        };

        info!("Parsing config files");
        for directory in configuration_directories().into_iter() {
            let path = directory.join(CONFIG_FILE_NAME);
            debug!("Checking path: {path:?}");

            if path.exists() && path.is_file() {
                info!("Found config file at: {path:?}");
                return Ok((Self::read_file(&path)?, true));
            }
        }

        info!("No config file found. Use default config.");
        Ok((Settings::default(), false))
    }

    fn read_file(path: &Path) -> Result<Settings, Error> {
        // Open the file in read-only mode with buffer.
        let file = File::open(path)
            .map_err(|err| Error::IoPathError(path.to_path_buf(), "opening config file", err))?;
        let reader = BufReader::new(file);

        serde_yaml::from_reader(reader).map_err(|err| Error::ConfigDeserialization(err.to_string()))
    }

    /// Save the current configuration as a file to the given path. \
    /// If no path is given, the default configuration path will be used.
    pub fn save(&self, path: &Option<PathBuf>) -> Result<(), Error> {
        let config_path = if let Some(path) = path {
            expand_home(path)
        } else if let Ok(path) = std::env::var(COLLECT_AGENT_CONFIG_PATH_ENV) {
            PathBuf::from(path)
        } else if let Some(path) = default_configuration_directory() {
            path.join(CONFIG_FILE_NAME)
        } else {
            return Err(Error::Generic(
                "Failed to resolve default config directory. User home cannot be determined."
                    .into(),
            ));
        };
        let config_dir = config_path
            .parent()
            .ok_or_else(|| Error::Generic("Couldn't resolve config directory".into()))?;

        // Create the config dir, if it doesn't exist yet
        if !config_dir.as_os_str().is_empty() && !config_dir.exists() {
            create_dir_all(config_dir).map_err(|err| {
                Error::IoPathError(config_dir.to_path_buf(), "creating config dir", err)
            })?;
        }

        let content = serde_yaml::to_string(self).map_err(|err| {
            Error::Generic(format!("Configuration file serialization failed:\n{err}"))
        })?;
        let mut file = File::create(&config_path).map_err(|err| {
            Error::IoPathError(config_path.clone(), "creating settings file", err)
        })?;
        file.write_all(content.as_bytes()).map_err(|err| {
            Error::IoPathError(config_path.clone(), "writing settings file", err)
        })?;

        Ok(())
    }

    /// The job identity with explicit values taking precedence over the environment.
    pub fn job_identity(&self) -> JobIdentity {
        self.job_identity_with(|key| std::env::var(key).ok())
    }

    /// Same as [Settings::job_identity], with an arbitrary variable lookup.
    pub fn job_identity_with<F>(&self, lookup: F) -> JobIdentity
    where
        F: Fn(&str) -> Option<String>,
    {
        let job = &self.job;
        JobIdentity::from_lookup(|key| {
            let configured = match key {
                JOB_NAME_ENV => &job.job_name,
                JOB_INSTANCE_ID_ENV => &job.job_instance_id,
                SCENARIO_INSTANCE_ID_ENV => &job.scenario_instance_id,
                _ => &None,
            };
            configured
                .clone()
                .filter(|value| !value.is_empty())
                .or_else(|| lookup(key))
        })
    }
}
