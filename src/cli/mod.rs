//! CLI command implementations.

pub mod create;
pub mod delete;
pub mod inspect;
pub mod lifecycle;
pub mod list;
pub mod parsers;

use podmachine::config::PodmachineConfig;
use podmachine::wait::WaitPolicy;
use podmachine::Client;
use std::io::{BufRead, Write};
use std::time::Duration;

/// Open a client for `config`, optionally bounding state waits by `timeout`.
pub fn open_client(config: &PodmachineConfig, timeout: Option<Duration>) -> podmachine::Result<Client> {
    let mut client = Client::from_config(config)?;
    if let Some(timeout) = timeout {
        let interval = config.wait_policy().interval;
        client.context_mut().wait = wait_policy_for(timeout, interval);
    }
    Ok(client)
}

/// Wait policy that gives up after roughly `timeout`.
fn wait_policy_for(timeout: Duration, interval: Duration) -> WaitPolicy {
    let interval = interval.min(timeout).max(Duration::from_millis(100));
    let attempts = (timeout.as_millis() / interval.as_millis()).max(1);
    WaitPolicy::new(interval, u32::try_from(attempts).unwrap_or(u32::MAX))
}

/// Ask a yes/no question on the terminal. Anything but `y` means no.
pub fn confirm(question: &str) -> podmachine::Result<bool> {
    print!("{} (y/n): ", question);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}
