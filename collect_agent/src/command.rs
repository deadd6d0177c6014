//! The [`Command`] enum and the line protocol it's rendered to.
//!
//! Every command is a single line of space separated fields, starting with its opcode:
//!
//! | Opcode | Format |
//! |---|---|
//! | `1` | `1 <config_file> <job_name> <job_instance_id> <scenario_instance_id> <is_new> [<suffix>]` |
//! | `2` | `2 <connection_id> <timestamp> ["<key>" "<value>"]* [<suffix>]` |
//! | `3` | `3 <connection_id>` |
//! | `4` | `4 <connection_id>` |
//! | `5` | `5` |
//! | `6` | `6 <scenario_instance_id> <job_instance_id> <storage> <broadcast>` |
//!
//! Booleans are rendered as `1` and `0`.
//! Optional trailing fields are left out entirely when they're missing or empty.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{error::Error, identity::JobIdentity, reply::ConnectionId, stat::StatRecord};

/// Macro to simplify creating [From] implementations for each variant-contained
/// Command; e.g. `impl_into_command!(Registration, Command::Register)` to make it possible
/// to use `Registration { }.into()` and get a [Command::Register] value.
macro_rules! impl_into_command {
    ($inner:ident, $variant:expr) => {
        impl From<$inner> for Command {
            fn from(message: $inner) -> Self {
                $variant(message)
            }
        }
    };
}

/// Everything a job can ask the relay to do.
#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
pub enum Command {
    /// Register the job and its statistics configuration file.
    Register(Registration),
    /// Push one batch of statistics.
    SendStat(SendStatRequest),
    /// Reload the configuration file of one registered job.
    Reload(ConnectionId),
    /// Remove a registered job from the relay.
    Remove(ConnectionId),
    /// Reload the configuration of every registered job.
    ReloadAll,
    /// Change the storage/broadcast policy of a job instance.
    ChangeConfig(ChangeConfigRequest),
}

#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
pub struct Registration {
    /// Path to the file describing which statistics are stored and/or broadcast.
    pub config_file: String,
    pub identity: JobIdentity,
    /// Whether the relay should start a new statistics file for this job.
    pub is_new: bool,
    /// Optional trailing field. Depending on the relay version it's used as a prefix or
    /// a suffix for the names of the job's statistics.
    pub suffix: Option<String>,
}
impl_into_command!(Registration, Command::Register);

/// The statistics carried by a [SendStatRequest].
#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
pub enum StatPayload {
    /// Name/value pairs, rendered as `"<name>" "<value>"`.
    Pairs(BTreeMap<String, String>),
    /// Pairs that have already been rendered by the caller.
    /// They're put on the wire as they are.
    Prepared(String),
}

#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
pub struct SendStatRequest {
    pub connection_id: ConnectionId,
    pub timestamp: i64,
    pub stats: StatPayload,
    pub suffix: Option<String>,
}
impl_into_command!(SendStatRequest, Command::SendStat);

impl SendStatRequest {
    pub fn from_record(
        connection_id: ConnectionId,
        record: StatRecord,
        suffix: Option<String>,
    ) -> Self {
        SendStatRequest {
            connection_id,
            timestamp: record.timestamp,
            stats: StatPayload::Pairs(record.stats),
            suffix,
        }
    }
}

#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
pub struct ChangeConfigRequest {
    pub scenario_instance_id: String,
    pub job_instance_id: String,
    pub storage: bool,
    pub broadcast: bool,
}
impl_into_command!(ChangeConfigRequest, Command::ChangeConfig);

impl Command {
    /// The leading integer token selecting the operation on the relay side.
    pub fn opcode(&self) -> u8 {
        match self {
            Command::Register(_) => 1,
            Command::SendStat(_) => 2,
            Command::Reload(_) => 3,
            Command::Remove(_) => 4,
            Command::ReloadAll => 5,
            Command::ChangeConfig(_) => 6,
        }
    }

    /// Render the command as a single protocol line without trailing newline.
    pub fn encode(&self) -> Result<String, Error> {
        let mut line = self.opcode().to_string();

        match self {
            Command::Register(registration) => {
                let identity = &registration.identity;
                push_token(&mut line, "config file", &registration.config_file)?;
                push_token(&mut line, "job name", &identity.job_name)?;
                push_token(&mut line, "job instance id", &identity.job_instance_id)?;
                push_token(
                    &mut line,
                    "scenario instance id",
                    &identity.scenario_instance_id,
                )?;
                push_flag(&mut line, registration.is_new);
                push_optional_token(&mut line, "suffix", &registration.suffix)?;
            }
            Command::SendStat(request) => {
                line.push_str(&format!(" {} {}", request.connection_id, request.timestamp));
                match &request.stats {
                    StatPayload::Pairs(stats) => {
                        for (name, value) in stats {
                            push_quoted(&mut line, "stat name", name)?;
                            push_quoted(&mut line, "stat value", value)?;
                        }
                    }
                    StatPayload::Prepared(stats) => {
                        reject_line_breaks("prepared stats", stats)?;
                        if !stats.is_empty() {
                            line.push(' ');
                            line.push_str(stats);
                        }
                    }
                }
                push_optional_token(&mut line, "suffix", &request.suffix)?;
            }
            Command::Reload(connection_id) | Command::Remove(connection_id) => {
                line.push_str(&format!(" {connection_id}"));
            }
            Command::ReloadAll => {}
            Command::ChangeConfig(request) => {
                push_token(
                    &mut line,
                    "scenario instance id",
                    &request.scenario_instance_id,
                )?;
                push_token(&mut line, "job instance id", &request.job_instance_id)?;
                push_flag(&mut line, request.storage);
                push_flag(&mut line, request.broadcast);
            }
        }

        Ok(line)
    }
}

fn encoding_error(field: &'static str, value: &str, reason: &'static str) -> Error {
    Error::Encoding {
        field,
        value: value.to_string(),
        reason,
    }
}

fn reject_line_breaks(field: &'static str, value: &str) -> Result<(), Error> {
    if value.contains(['\n', '\r']) {
        return Err(encoding_error(field, value, "line breaks would split the command"));
    }
    Ok(())
}

/// Append an unquoted positional field.
fn push_token(line: &mut String, field: &'static str, value: &str) -> Result<(), Error> {
    if value.is_empty() {
        return Err(encoding_error(field, value, "positional fields can't be empty"));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(encoding_error(field, value, "whitespace would shift the following fields"));
    }
    if value.contains(['"', '\'']) {
        return Err(encoding_error(field, value, "quotes aren't allowed in unquoted fields"));
    }
    if value.contains('\\') {
        return Err(encoding_error(field, value, "backslashes would escape the next character"));
    }

    line.push(' ');
    line.push_str(value);
    Ok(())
}

/// Trailing fields are left out if they're missing or empty.
fn push_optional_token(
    line: &mut String,
    field: &'static str,
    value: &Option<String>,
) -> Result<(), Error> {
    match value.as_deref() {
        None | Some("") => Ok(()),
        Some(value) => push_token(line, field, value),
    }
}

/// The protocol has no escaping rule, so embedded double quotes and backslashes are rejected.
fn push_quoted(line: &mut String, field: &'static str, value: &str) -> Result<(), Error> {
    if value.contains('"') {
        return Err(encoding_error(field, value, "quotes can't be escaped"));
    }
    if value.contains('\\') {
        return Err(encoding_error(field, value, "backslashes would escape the closing quote"));
    }
    reject_line_breaks(field, value)?;

    line.push_str(" \"");
    line.push_str(value);
    line.push('"');
    Ok(())
}

fn push_flag(line: &mut String, flag: bool) {
    line.push_str(if flag { " 1" } else { " 0" });
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn id(value: u32) -> ConnectionId {
        ConnectionId::new(value).expect("Non-zero id")
    }

    fn registration() -> Registration {
        Registration {
            config_file: "x.conf".into(),
            identity: JobIdentity::new("jobA", 1, 2),
            is_new: false,
            suffix: None,
        }
    }

    #[test]
    fn test_register_encoding() -> Result<(), Error> {
        let command: Command = registration().into();
        assert_eq!(command.encode()?, "1 x.conf jobA 1 2 0");

        let command: Command = Registration {
            is_new: true,
            suffix: Some("eth0".into()),
            ..registration()
        }
        .into();
        assert_eq!(command.encode()?, "1 x.conf jobA 1 2 1 eth0");

        Ok(())
    }

    #[test]
    fn test_empty_suffix_is_omitted() -> Result<(), Error> {
        let command: Command = Registration {
            suffix: Some(String::new()),
            ..registration()
        }
        .into();
        assert_eq!(command.encode()?, "1 x.conf jobA 1 2 0");

        Ok(())
    }

    #[test]
    fn test_send_stat_encoding() -> Result<(), Error> {
        let record = StatRecord::new(1_500_000_000_000)
            .with("mem", "20")
            .with("cpu", "10");
        let command: Command = SendStatRequest::from_record(id(7), record, None).into();
        let line = command.encode()?;

        assert!(line.starts_with("2 7 1500000000000 "));
        assert!(line.contains("\"cpu\" \"10\""));
        assert!(line.contains("\"mem\" \"20\""));
        // Pairs are sorted by name.
        assert_eq!(line, "2 7 1500000000000 \"cpu\" \"10\" \"mem\" \"20\"");

        Ok(())
    }

    #[test]
    fn test_send_prepared_stat_encoding() -> Result<(), Error> {
        let command: Command = SendStatRequest {
            connection_id: id(3),
            timestamp: 42,
            stats: StatPayload::Prepared("\"rtt\" \"12.5\"".into()),
            suffix: Some("flow1".into()),
        }
        .into();
        assert_eq!(command.encode()?, "2 3 42 \"rtt\" \"12.5\" flow1");

        let command: Command = SendStatRequest {
            connection_id: id(3),
            timestamp: 42,
            stats: StatPayload::Prepared(String::new()),
            suffix: None,
        }
        .into();
        assert_eq!(command.encode()?, "2 3 42");

        Ok(())
    }

    #[test]
    fn test_change_config_encoding() -> Result<(), Error> {
        let command: Command = ChangeConfigRequest {
            scenario_instance_id: "5".into(),
            job_instance_id: "9".into(),
            storage: true,
            broadcast: false,
        }
        .into();
        assert_eq!(command.encode()?, "6 5 9 1 0");

        Ok(())
    }

    #[rstest]
    #[case("cpu\"", "10")]
    #[case("cpu", "1\"0")]
    #[case("cpu", "10\n3 1")]
    #[case("path", "C:\\")]
    #[case("dir\\", "1")]
    fn test_corrupting_stats_are_rejected(#[case] name: &str, #[case] value: &str) {
        let record = StatRecord::new(0).with(name, value);
        let command: Command = SendStatRequest::from_record(id(1), record, None).into();

        let result = command.encode();
        assert!(
            matches!(result, Err(Error::Encoding { .. })),
            "Expected an encoding error, got {result:?}"
        );
    }

    #[rstest]
    #[case("my conf.conf")]
    #[case("")]
    #[case("x.conf\n5")]
    #[case("o'brien.conf")]
    #[case("conf\\")]
    fn test_invalid_config_file_is_rejected(#[case] config_file: &str) {
        let command: Command = Registration {
            config_file: config_file.into(),
            ..registration()
        }
        .into();

        assert!(matches!(
            command.encode(),
            Err(Error::Encoding {
                field: "config file",
                ..
            })
        ));
    }

    #[rstest]
    #[case("o'brien")]
    #[case("job\\")]
    fn test_unbalanced_job_name_is_rejected(#[case] job_name: &str) {
        let command: Command = Registration {
            identity: JobIdentity::new(job_name, 1, 2),
            ..registration()
        }
        .into();

        let result = command.encode();
        assert!(
            matches!(result, Err(Error::Encoding { field: "job name", .. })),
            "Expected an encoding error, got {result:?}"
        );
    }

    /// Single quotes are plain characters inside a quoted field.
    #[test]
    fn test_single_quote_in_stat_is_kept() -> Result<(), Error> {
        let record = StatRecord::new(0).with("host", "o'brien");
        let command: Command = SendStatRequest::from_record(id(1), record, None).into();
        assert_eq!(command.encode()?, "2 1 0 \"host\" \"o'brien\"");

        Ok(())
    }

    /// The opcode is always the first token and no command spans several lines.
    #[rstest]
    #[case(registration().into(), 1)]
    #[case(SendStatRequest::from_record(id(1), StatRecord::new(3).with("a", "b"), Some("s".into())).into(), 2)]
    #[case(Command::Reload(id(2)), 3)]
    #[case(Command::Remove(id(2)), 4)]
    #[case(Command::ReloadAll, 5)]
    #[case(ChangeConfigRequest {
        scenario_instance_id: "1".into(),
        job_instance_id: "2".into(),
        storage: false,
        broadcast: true,
    }.into(), 6)]
    fn test_opcode_leads_single_line(#[case] command: Command, #[case] opcode: u8) {
        let line = command.encode().expect("Valid command");

        assert_eq!(command.opcode(), opcode);
        assert_eq!(line.split(' ').next(), Some(opcode.to_string().as_str()));
        assert!(!line.contains(['\n', '\r']));
    }
}
