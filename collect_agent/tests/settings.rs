use std::time::Duration;

use collect_agent::settings::{Job, Relay, Settings};
use collect_agent::{CollectAgent, Error, RELAY_PORT};
use color_eyre::Result;
use pretty_assertions::assert_eq;
use tempfile::Builder;

/// Settings written to disk are read back unchanged.
#[test]
fn test_save_and_read() -> Result<()> {
    let tempdir = Builder::new().prefix("collect_agent-").tempdir()?;
    let path = tempdir.path().join("nested").join("collect_agent.yml");

    let settings = Settings {
        relay: Relay {
            host: "localhost".into(),
            reply_timeout_ms: Some(250),
        },
        job: Job {
            job_name: Some("iperf3".into()),
            job_instance_id: Some("5".into()),
            scenario_instance_id: None,
        },
    };
    settings.save(&Some(path.clone()))?;

    let (read, found) = Settings::read(&Some(path))?;
    assert!(found);
    assert_eq!(read, settings);
    assert_eq!(read.relay.reply_timeout(), Some(Duration::from_millis(250)));

    Ok(())
}

#[test]
fn test_client_from_settings() -> Result<()> {
    let mut settings = Settings::default();
    settings.job.job_name = Some("fping".into());
    settings.job.job_instance_id = Some("8".into());
    settings.job.scenario_instance_id = Some("3".into());

    let agent = CollectAgent::from_settings(&settings)?;

    assert_eq!(agent.identity().job_name, "fping");
    assert_eq!(agent.identity().job_instance_id, "8");
    assert!(!agent.is_registered());
    assert_eq!(RELAY_PORT, 1111);

    Ok(())
}

#[test]
fn test_invalid_yaml() -> Result<()> {
    let tempdir = Builder::new().prefix("collect_agent-").tempdir()?;
    let path = tempdir.path().join("collect_agent.yml");
    std::fs::write(&path, "relay: [this, is, a, list]\n")?;

    let result = Settings::read(&Some(path));
    assert!(matches!(result, Err(Error::ConfigDeserialization(_))));

    Ok(())
}

#[test]
fn test_missing_file() {
    let result = Settings::read(&Some("/nonexistent/collect_agent.yml".into()));
    assert!(matches!(result, Err(Error::IoPathError(_, _, _))));
}
