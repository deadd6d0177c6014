//! The client jobs use to talk to the relay.
use std::time::Duration;

use crate::{
    command::{ChangeConfigRequest, Command, Registration, SendStatRequest, StatPayload},
    error::{Error, ProtocolError},
    identity::JobIdentity,
    internal_prelude::*,
    logging::{Logger, Priority, TracingLogger},
    reply::{ConnectionId, Reply},
    stat::StatRecord,
    transport::{Transport, UdpTransport},
};

/// The operations a job can run against the relay.
#[derive(PartialEq, Eq, Clone, Copy, Debug, strum::Display)]
pub enum Operation {
    Register,
    SendStat,
    Reload,
    Remove,
    ReloadAll,
    ChangeConfig,
}

impl Operation {
    /// Leading text of the failure reply produced when the operation couldn't be run.
    pub fn failure_prefix(self) -> &'static str {
        match self {
            Operation::Register => "Failed to register to rstats service",
            Operation::SendStat => "Failed to send statistic to rstats",
            Operation::Reload => "Failed to reload statistic",
            Operation::Remove => "Failed to remove statistic",
            Operation::ReloadAll => "Failed to reload statistics",
            Operation::ChangeConfig => "Failed to fetch configurations",
        }
    }
}

/// This struct owns everything a job needs to talk to the relay:
/// the transport, the job's identity and the connection id handed out at registration.
///
/// Every operation comes in two flavors:
/// - `try_*` returns a [Result], for callers that want to handle errors themselves.
/// - The plain variant never fails. Errors are logged and turned into a [Reply::Failure]
///   reading `KO Failed to <operation>: <cause>`.
///
/// Registering and removing change the connection id and thereby need exclusive access.
/// Share a client between threads only behind a lock, or use one client per job.
///
/// ```no_run
/// use collect_agent::{CollectAgent, JobIdentity, StatRecord};
///
/// # fn main() -> Result<(), collect_agent::Error> {
/// let mut agent = CollectAgent::new("127.0.0.1", JobIdentity::from_env())?;
///
/// agent.try_register("/opt/openbach/agent/jobs/fping/fping_rstats_filter.conf", false, None)?;
/// let reply = agent.send_stat(StatRecord::now().with("rtt", 12.5), None);
/// println!("{reply}");
///
/// agent.remove();
/// # Ok(())
/// # }
/// ```
pub struct CollectAgent {
    transport: Box<dyn Transport>,
    logger: Box<dyn Logger>,
    identity: JobIdentity,
    reply_timeout: Option<Duration>,
    connection_id: Option<ConnectionId>,
}

impl std::fmt::Debug for CollectAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectAgent")
            .field("transport", &"Transport<not_debuggable>")
            .field("identity", &self.identity)
            .field("reply_timeout", &self.reply_timeout)
            .field("connection_id", &self.connection_id)
            .finish()
    }
}

impl CollectAgent {
    /// Create a client for the relay on `host`.
    /// The address is resolved right away and reused for every call.
    pub fn new(host: &str, identity: JobIdentity) -> Result<Self, Error> {
        let transport = UdpTransport::new(host)?;
        Ok(Self::with_transport(transport, identity))
    }

    /// Create a client from the configuration.
    /// Job ids that aren't configured explicitly are read from the environment.
    #[cfg(feature = "settings")]
    pub fn from_settings(settings: &crate::settings::Settings) -> Result<Self, Error> {
        let client = Self::new(&settings.relay.host, settings.job_identity())?
            .with_reply_timeout(settings.relay.reply_timeout());
        Ok(client)
    }

    /// Create a client on top of an arbitrary transport.
    pub fn with_transport(transport: impl Transport + 'static, identity: JobIdentity) -> Self {
        CollectAgent {
            transport: Box::new(transport),
            logger: Box::new(TracingLogger::new(&identity)),
            identity,
            reply_timeout: None,
            connection_id: None,
        }
    }

    /// Replace the default [TracingLogger].
    pub fn with_logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Box::new(logger);
        self
    }

    /// Give up waiting for the relay's answer after `timeout`.
    /// Without timeout, which is the default, calls block until the relay answers.
    pub fn with_reply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn identity(&self) -> &JobIdentity {
        &self.identity
    }

    /// The id handed out by the relay, if the job is currently registered.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    pub fn is_registered(&self) -> bool {
        self.connection_id.is_some()
    }

    /// Emit a message through the client's logger.
    pub fn send_log(&self, priority: Priority, message: &str) {
        self.logger.emit(priority, message);
    }

    /// Encode a command, send it and return the relay's raw reply.
    pub fn exchange(&self, command: &Command) -> Result<String, Error> {
        let line = command.encode()?;
        debug!("Sending command: {line}");
        let raw = self.transport.exchange(&line, self.reply_timeout)?;
        debug!("Received reply: {raw}");

        Ok(raw)
    }

    /// Register the job at the relay, remembering the connection id it hands out.
    ///
    /// `suffix` is an optional trailing field the relay appends to the job's statistics.
    /// A failed registration leaves the current connection id untouched.
    pub fn try_register(
        &mut self,
        config_file: &str,
        is_new: bool,
        suffix: Option<&str>,
    ) -> Result<ConnectionId, Error> {
        match self.register_reply(config_file, is_new, suffix)?.into_result()? {
            Reply::Registered(id) => Ok(id),
            reply => Err(ProtocolError::Malformed(reply.to_string()).into()),
        }
    }

    /// Never failing variant of [CollectAgent::try_register].
    pub fn register(&mut self, config_file: &str, is_new: bool, suffix: Option<&str>) -> Reply {
        let result = self.register_reply(config_file, is_new, suffix);
        self.reply_or_failure(Operation::Register, result)
    }

    fn register_reply(
        &mut self,
        config_file: &str,
        is_new: bool,
        suffix: Option<&str>,
    ) -> Result<Reply, Error> {
        let command: Command = Registration {
            config_file: config_file.to_string(),
            identity: self.identity.clone(),
            is_new,
            suffix: suffix.map(str::to_string),
        }
        .into();

        let raw = self.exchange(&command)?;
        let reply = Reply::parse_registration(&raw);
        match &reply {
            Reply::Registered(id) => {
                self.connection_id = Some(*id);
                self.logger
                    .emit(Priority::Notice, &format!("Connection ID is {id}"));
            }
            Reply::Failure(_) => {
                self.logger
                    .emit(Priority::Error, "rstats refused the registration");
                self.logger.emit(Priority::Error, &format!("\t{raw}"));
            }
            _ => {
                self.logger
                    .emit(Priority::Error, "Return message isn't well formed");
                self.logger.emit(Priority::Error, &format!("\t{raw}"));
            }
        }

        Ok(reply)
    }

    /// Push a batch of statistics. Returns the relay's raw reply.
    pub fn try_send_stat(&self, record: StatRecord, suffix: Option<&str>) -> Result<String, Error> {
        let request = SendStatRequest::from_record(
            self.registered_id()?,
            record,
            suffix.map(str::to_string),
        );
        self.raw_success(request.into())
    }

    /// Never failing variant of [CollectAgent::try_send_stat].
    pub fn send_stat(&self, record: StatRecord, suffix: Option<&str>) -> Reply {
        let result = self.registered_id().and_then(|connection_id| {
            let request =
                SendStatRequest::from_record(connection_id, record, suffix.map(str::to_string));
            self.request(request.into())
        });
        self.reply_or_failure(Operation::SendStat, result)
    }

    /// Push statistics whose pairs have already been rendered, e.g. by a language binding.
    /// `stats` is put on the wire as it is, see [StatPayload::Prepared].
    pub fn try_send_prepared_stat(
        &self,
        timestamp: i64,
        stats: &str,
        suffix: Option<&str>,
    ) -> Result<String, Error> {
        let request = self.prepared_request(timestamp, stats, suffix)?;
        self.raw_success(request.into())
    }

    /// Never failing variant of [CollectAgent::try_send_prepared_stat].
    pub fn send_prepared_stat(&self, timestamp: i64, stats: &str, suffix: Option<&str>) -> Reply {
        let result = self
            .prepared_request(timestamp, stats, suffix)
            .and_then(|request| self.request(request.into()));
        self.reply_or_failure(Operation::SendStat, result)
    }

    fn prepared_request(
        &self,
        timestamp: i64,
        stats: &str,
        suffix: Option<&str>,
    ) -> Result<SendStatRequest, Error> {
        Ok(SendStatRequest {
            connection_id: self.registered_id()?,
            timestamp,
            stats: StatPayload::Prepared(stats.to_string()),
            suffix: suffix.map(str::to_string),
        })
    }

    /// Ask the relay to reload the job's statistics configuration.
    pub fn try_reload(&self) -> Result<String, Error> {
        self.raw_success(Command::Reload(self.registered_id()?))
    }

    /// Never failing variant of [CollectAgent::try_reload].
    pub fn reload(&self) -> Reply {
        let result = self
            .registered_id()
            .and_then(|connection_id| self.request(Command::Reload(connection_id)));
        self.reply_or_failure(Operation::Reload, result)
    }

    /// Remove the job from the relay.
    /// Once the relay accepted, the client is unregistered.
    pub fn try_remove(&mut self) -> Result<String, Error> {
        let reply = self.remove_reply()?.into_result()?;
        Ok(reply.to_string())
    }

    /// Never failing variant of [CollectAgent::try_remove].
    pub fn remove(&mut self) -> Reply {
        let result = self.remove_reply();
        self.reply_or_failure(Operation::Remove, result)
    }

    fn remove_reply(&mut self) -> Result<Reply, Error> {
        let reply = self.request(Command::Remove(self.registered_id()?))?;
        if reply.success() {
            info!("Removed from rstats, connection id is no longer valid");
            self.connection_id = None;
        }

        Ok(reply)
    }

    /// Ask the relay to reload the configuration of all registered jobs.
    /// This doesn't need a registration.
    pub fn try_reload_all(&self) -> Result<String, Error> {
        self.raw_success(Command::ReloadAll)
    }

    /// Never failing variant of [CollectAgent::try_reload_all].
    pub fn reload_all(&self) -> Reply {
        let result = self.request(Command::ReloadAll);
        self.reply_or_failure(Operation::ReloadAll, result)
    }

    /// Change whether the statistics of this job instance are stored and/or broadcast.
    pub fn try_change_config(&self, storage: bool, broadcast: bool) -> Result<String, Error> {
        self.raw_success(self.change_config_command(storage, broadcast))
    }

    /// Never failing variant of [CollectAgent::try_change_config].
    pub fn change_config(&self, storage: bool, broadcast: bool) -> Reply {
        let result = self.request(self.change_config_command(storage, broadcast));
        self.reply_or_failure(Operation::ChangeConfig, result)
    }

    fn change_config_command(&self, storage: bool, broadcast: bool) -> Command {
        ChangeConfigRequest {
            scenario_instance_id: self.identity.scenario_instance_id.clone(),
            job_instance_id: self.identity.job_instance_id.clone(),
            storage,
            broadcast,
        }
        .into()
    }

    /// Per-job commands can't be built without a connection id.
    fn registered_id(&self) -> Result<ConnectionId, Error> {
        self.connection_id.ok_or(Error::NotRegistered)
    }

    /// Run any command but a registration.
    fn request(&self, command: Command) -> Result<Reply, Error> {
        let raw = self.exchange(&command)?;
        Ok(Reply::parse(&raw))
    }

    fn raw_success(&self, command: Command) -> Result<String, Error> {
        let reply = self.request(command)?.into_result()?;
        Ok(reply.to_string())
    }

    /// Turn errors into the uniform failure reply and log them.
    fn reply_or_failure(&self, operation: Operation, result: Result<Reply, Error>) -> Reply {
        match result {
            Ok(reply) => reply,
            Err(err) => {
                let reply = Reply::Failure(format!("{}: {err}", operation.failure_prefix()));
                self.logger.emit(Priority::Error, &reply.to_string());
                reply
            }
        }
    }
}
