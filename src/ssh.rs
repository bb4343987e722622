//! Remote command channel.
//!
//! Provisioners and host queries only ever run one command and read its
//! output. [`ExternalSshClient`] does that with the system `ssh` binary.

use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::wait::WaitPolicy;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

/// Exit status `ssh` uses for its own connection failures.
const SSH_CONNECTION_FAILED: i32 = 255;

/// Options shared by every `ssh` invocation.
const SSH_OPTS: &[&str] = &[
    "-o", "StrictHostKeyChecking=no",
    "-o", "UserKnownHostsFile=/dev/null",
    "-o", "LogLevel=quiet",
    "-o", "BatchMode=yes",
    "-o", "ConnectTimeout=10",
    "-o", "PasswordAuthentication=no",
];

/// Runs a single command on a machine and returns its standard output.
pub trait CommandChannel: Send + Sync {
    /// Run `command` and return its output.
    ///
    /// Connection failures are [`Error::CommandChannelUnreachable`]; a
    /// command exiting non-zero is [`Error::CommandFailed`].
    fn output(&self, command: &str) -> Result<String>;
}

/// Opens command channels for drivers.
pub trait ChannelFactory: Send + Sync {
    /// Channel to the machine controlled by `driver`.
    fn connect(&self, driver: &dyn Driver) -> Result<Arc<dyn CommandChannel>>;
}

/// Block until `channel` runs `exit 0` successfully.
pub fn wait_for_channel(
    channel: &dyn CommandChannel,
    policy: &WaitPolicy,
    machine: &str,
) -> Result<()> {
    tracing::debug!(machine, "waiting for command channel");

    let mut last_error = String::new();
    let result = policy.wait_for("command channel", || match channel.output("exit 0") {
        Ok(_) => Ok(true),
        Err(e) => {
            tracing::trace!(machine, error = %e, "command channel not ready");
            last_error = e.to_string();
            Ok(false)
        }
    });

    match result {
        Err(Error::Timeout { after, .. }) => Err(Error::CommandChannelUnreachable(format!(
            "{} after {:?}: {}",
            machine, after, last_error
        ))),
        other => other,
    }
}

/// Quote `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Command channel backed by the system `ssh` client.
#[derive(Debug, Clone)]
pub struct ExternalSshClient {
    host: String,
    port: u16,
    user: String,
    key: Option<PathBuf>,
}

impl ExternalSshClient {
    /// Create a client for `user@host:port`.
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>, key: Option<PathBuf>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            key,
        }
    }

    /// Create a client from a driver's SSH settings.
    pub fn for_driver(driver: &dyn Driver) -> Result<Self> {
        Ok(Self::new(
            driver.ssh_hostname()?,
            driver.ssh_port()?,
            driver.ssh_username()?,
            driver.ssh_key_path()?,
        ))
    }

    /// Arguments passed to `ssh` for `command`.
    pub fn args(&self, command: &str) -> Vec<String> {
        let mut args: Vec<String> = SSH_OPTS.iter().map(|s| s.to_string()).collect();
        if let Some(key) = &self.key {
            args.push("-o".into());
            args.push("IdentitiesOnly=yes".into());
            args.push("-i".into());
            args.push(key.display().to_string());
        }
        args.push("-p".into());
        args.push(self.port.to_string());
        args.push(format!("{}@{}", self.user, self.host));
        args.push(command.to_string());
        args
    }
}

impl CommandChannel for ExternalSshClient {
    fn output(&self, command: &str) -> Result<String> {
        tracing::debug!(host = %self.host, port = self.port, command, "running remote command");

        let output = Command::new("ssh").args(self.args(command)).output()?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        match output.status.code() {
            Some(SSH_CONNECTION_FAILED) => Err(Error::CommandChannelUnreachable(format!(
                "{}@{}:{}: {}",
                self.user, self.host, self.port, stderr
            ))),
            code => Err(Error::command_failed(
                command,
                format!(
                    "exit status {}: {}{}",
                    code.map(|c| c.to_string()).unwrap_or_else(|| "signal".into()),
                    stdout.trim(),
                    stderr
                ),
            )),
        }
    }
}

/// Opens [`ExternalSshClient`] channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshChannelFactory;

impl ChannelFactory for SshChannelFactory {
    fn connect(&self, driver: &dyn Driver) -> Result<Arc<dyn CommandChannel>> {
        Ok(Arc::new(ExternalSshClient::for_driver(driver)?))
    }
}

/// Hands out the same channel for every driver.
pub struct FixedChannelFactory(pub Arc<dyn CommandChannel>);

impl ChannelFactory for FixedChannelFactory {
    fn connect(&self, _driver: &dyn Driver) -> Result<Arc<dyn CommandChannel>> {
        Ok(self.0.clone())
    }
}

/// Command channel that answers from a script and records every command.
///
/// Rules match on command prefix, first rule wins. Unmatched commands
/// succeed with empty output.
#[derive(Default)]
pub struct ScriptedChannel {
    rules: Vec<(String, std::result::Result<String, String>)>,
    log: Mutex<Vec<String>>,
}

impl ScriptedChannel {
    /// Channel where every command succeeds with empty output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `output`.
    pub fn respond(mut self, prefix: impl Into<String>, output: impl Into<String>) -> Self {
        self.rules.push((prefix.into(), Ok(output.into())));
        self
    }

    /// Fail commands starting with `prefix` with `message`.
    pub fn fail(mut self, prefix: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules.push((prefix.into(), Err(message.into())));
        self
    }

    /// Commands run so far.
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl CommandChannel for ScriptedChannel {
    fn output(&self, command: &str) -> Result<String> {
        self.log.lock().push(command.to_string());

        let rule = self
            .rules
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()));

        match rule {
            Some((_, Ok(output))) => Ok(output.clone()),
            Some((_, Err(message))) => Err(Error::command_failed(command, message.clone())),
            None => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakeDriver;
    use std::time::Duration;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_args_from_driver() {
        let mut fake = FakeDriver::running("dev");
        fake.base.ssh_port = 2222;
        fake.base.ssh_key_path = Some(PathBuf::from("/keys/id_rsa"));

        let client = ExternalSshClient::for_driver(&fake).unwrap();
        let args = client.args("uname -a");

        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(args.windows(2).any(|w| w == ["-p", "2222"]));
        assert!(args.windows(2).any(|w| w == ["-i", "/keys/id_rsa"]));
        assert_eq!(args[args.len() - 2], "root@127.0.0.1");
        assert_eq!(args[args.len() - 1], "uname -a");
    }

    #[test]
    fn test_scripted_channel_first_rule_wins() {
        let channel = ScriptedChannel::new()
            .respond("cat /etc/os-release", "ID=fedora\n")
            .fail("cat", "no such file");

        assert_eq!(channel.output("cat /etc/os-release").unwrap(), "ID=fedora\n");
        assert!(channel.output("cat /nope").is_err());
        assert_eq!(channel.output("hostname").unwrap(), "");
        assert_eq!(channel.commands().len(), 3);
    }

    #[test]
    fn test_wait_for_channel_unreachable() {
        let channel = ScriptedChannel::new().fail("exit 0", "connection refused");
        let policy = WaitPolicy::new(Duration::from_millis(1), 3);

        let err = wait_for_channel(&channel, &policy, "dev").unwrap_err();
        assert!(matches!(err, Error::CommandChannelUnreachable(_)));
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(channel.commands().len(), 3);
    }

    #[test]
    fn test_wait_for_channel_ready() {
        let channel = ScriptedChannel::new();
        wait_for_channel(&channel, &WaitPolicy::default(), "dev").unwrap();
    }
}
