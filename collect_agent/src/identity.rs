use serde::{Deserialize, Serialize};

/// Environment variable holding the name of the running job.
pub const JOB_NAME_ENV: &str = "JOB_NAME";
/// Environment variable holding the id of this job instance.
pub const JOB_INSTANCE_ID_ENV: &str = "JOB_INSTANCE_ID";
/// Environment variable holding the id of the scenario instance the job belongs to.
pub const SCENARIO_INSTANCE_ID_ENV: &str = "SCENARIO_INSTANCE_ID";

/// Name used when a job runs outside of a scenario, i.e. without [JOB_NAME_ENV].
pub const DEBUG_JOB_NAME: &str = "job_debug";

/// Identifiers of the job that's talking to the relay.
///
/// They are captured once, usually from the environment the controller starts jobs with,
/// and embedded in the registration and configuration commands.
#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
pub struct JobIdentity {
    pub job_name: String,
    pub job_instance_id: String,
    pub scenario_instance_id: String,
}

impl Default for JobIdentity {
    fn default() -> Self {
        JobIdentity {
            job_name: DEBUG_JOB_NAME.to_string(),
            job_instance_id: "0".to_string(),
            scenario_instance_id: "0".to_string(),
        }
    }
}

impl JobIdentity {
    pub fn new(
        job_name: impl Into<String>,
        job_instance_id: impl ToString,
        scenario_instance_id: impl ToString,
    ) -> Self {
        JobIdentity {
            job_name: job_name.into(),
            job_instance_id: job_instance_id.to_string(),
            scenario_instance_id: scenario_instance_id.to_string(),
        }
    }

    /// Read the identity from the process environment.
    /// Missing variables fall back to the values of [JobIdentity::default].
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the identity from an arbitrary variable lookup.
    /// Empty values are treated like missing ones.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = JobIdentity::default();
        let get = |key: &str, default: String| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .unwrap_or(default)
        };

        JobIdentity {
            job_name: get(JOB_NAME_ENV, defaults.job_name),
            job_instance_id: get(JOB_INSTANCE_ID_ENV, defaults.job_instance_id),
            scenario_instance_id: get(SCENARIO_INSTANCE_ID_ENV, defaults.scenario_instance_id),
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_lookup_with_all_variables() {
        let env: HashMap<&str, &str> = HashMap::from([
            (JOB_NAME_ENV, "fping"),
            (JOB_INSTANCE_ID_ENV, "12"),
            (SCENARIO_INSTANCE_ID_ENV, "3"),
        ]);
        let identity = JobIdentity::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(identity, JobIdentity::new("fping", 12, 3));
    }

    /// Jobs started by hand don't have any of the variables set.
    #[test]
    fn test_lookup_falls_back_to_debug_identity() {
        let identity = JobIdentity::from_lookup(|key| match key {
            JOB_INSTANCE_ID_ENV => Some(String::new()),
            _ => None,
        });

        assert_eq!(identity.job_name, DEBUG_JOB_NAME);
        assert_eq!(identity.job_instance_id, "0");
        assert_eq!(identity.scenario_instance_id, "0");
    }
}
