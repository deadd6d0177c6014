mod helper;

use collect_agent::prelude::*;
use color_eyre::Result;
use pretty_assertions::assert_eq;

/// Walk through the whole life of a job: register, report, reconfigure and leave.
#[test]
fn test_job_lifecycle() -> Result<()> {
    better_panic::install();
    let (address, relay) = helper::spawn_relay(&["OK 42", "OK", "OK", "OK", "OK", "OK"]);
    let mut agent = helper::agent(address);

    let id = agent.try_register("x.conf", false, None)?;
    assert_eq!(id.get(), 42);
    assert_eq!(agent.connection_id(), Some(id));

    let record = StatRecord::new(1_700_000_000_000)
        .with("cpu", "10")
        .with("mem", "20");
    assert_eq!(agent.send_stat(record, Some("eth0")), Reply::Success("OK".into()));
    assert_eq!(agent.reload(), Reply::Success("OK".into()));
    assert_eq!(agent.change_config(true, false), Reply::Success("OK".into()));
    assert_eq!(agent.reload_all(), Reply::Success("OK".into()));
    assert_eq!(agent.remove(), Reply::Success("OK".into()));
    assert!(!agent.is_registered());

    let received = relay.join().expect("Relay thread panicked");
    assert_eq!(
        received,
        vec![
            "1 x.conf jobA 1 2 0",
            "2 42 1700000000000 \"cpu\" \"10\" \"mem\" \"20\" eth0",
            "3 42",
            "6 2 1 1 0",
            "5",
            "4 42",
        ]
    );

    // Removed jobs can't send anything anymore.
    let reply = agent.send_stat(StatRecord::now().with("cpu", "11"), None);
    assert!(reply
        .to_string()
        .starts_with("KO Failed to send statistic to rstats: "));

    Ok(())
}

#[test]
fn test_refused_registration() -> Result<()> {
    let (address, relay) = helper::spawn_relay(&["KO something"]);
    let mut agent = helper::agent(address);

    let reply = agent.register("x.conf", true, Some("prefix"));

    assert_eq!(reply, Reply::Failure("something".into()));
    assert_eq!(reply.to_string(), "KO something");
    assert!(!agent.is_registered());
    assert_eq!(relay.join().unwrap(), vec!["1 x.conf jobA 1 2 1 prefix"]);

    Ok(())
}

/// A relay that doesn't answer in time surfaces as a failure reply.
#[test]
fn test_silent_relay() -> Result<()> {
    let silent = std::net::UdpSocket::bind("127.0.0.1:0")?;
    let agent = helper::agent(silent.local_addr()?)
        .with_reply_timeout(Some(std::time::Duration::from_millis(200)));

    let reply = agent.reload_all();
    assert!(
        reply
            .to_string()
            .starts_with("KO Failed to reload statistics: No answer from rstats"),
        "Unexpected reply {reply}"
    );

    assert!(matches!(
        agent.try_reload_all(),
        Err(Error::Transport(TransportError::Timeout(_)))
    ));

    Ok(())
}
