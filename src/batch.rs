//! Multi-host operations.
//!
//! Each host runs on its own scoped thread; one host failing never stops
//! the others. Failures are concatenated into a single [`Error::Batch`].

use crate::api::Client;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::host::{validate_host_name, Host};
use std::fmt;

/// Machine used when no names are given.
pub const DEFAULT_HOST: &str = "default";

/// Lifecycle verb applied to several hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAction {
    /// Start.
    Start,
    /// Graceful stop.
    Stop,
    /// Forceful stop.
    Kill,
    /// Restart.
    Restart,
    /// Upgrade the engine.
    Upgrade,
    /// Re-run provisioning.
    Provision,
    /// Redistribute certificates.
    ConfigureAuth,
    /// Re-check and redistribute certificates.
    ConfigureAllAuth,
}

impl HostAction {
    /// Verb name used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            HostAction::Start => "start",
            HostAction::Stop => "stop",
            HostAction::Kill => "kill",
            HostAction::Restart => "restart",
            HostAction::Upgrade => "upgrade",
            HostAction::Provision => "provision",
            HostAction::ConfigureAuth => "configure auth",
            HostAction::ConfigureAllAuth => "regenerate certificates",
        }
    }

    /// Run the verb on `host`.
    pub fn apply(&self, host: &mut Host, ctx: &Context) -> Result<()> {
        match self {
            HostAction::Start => host.start(ctx),
            HostAction::Stop => host.stop(ctx),
            HostAction::Kill => host.kill(ctx),
            HostAction::Restart => host.restart(ctx),
            HostAction::Upgrade => host.upgrade(ctx),
            HostAction::Provision => host.provision(ctx),
            HostAction::ConfigureAuth => host.configure_auth(ctx),
            HostAction::ConfigureAllAuth => host.configure_all_auth(ctx),
        }
    }
}

impl fmt::Display for HostAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names to act on: `names` if given, else the default machine.
pub fn target_hosts(client: &Client, names: &[String]) -> Result<Vec<String>> {
    if !names.is_empty() {
        return Ok(names.to_vec());
    }
    if client.exists(DEFAULT_HOST)? {
        Ok(vec![DEFAULT_HOST.to_string()])
    } else {
        Err(Error::NoDefaultHost)
    }
}

/// Run `action` on every host in parallel and report each outcome in
/// input order.
pub fn run_action_for_each(
    action: HostAction,
    hosts: &mut [Host],
    ctx: &Context,
) -> Vec<(String, Result<()>)> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = hosts
            .iter_mut()
            .map(|host| {
                let name = host.name.clone();
                let handle = scope.spawn(move || {
                    tracing::debug!(machine = %host.name, action = %action, "running action");
                    action.apply(host, ctx)
                });
                (name, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(name, handle)| {
                let result = handle.join().unwrap_or_else(|_| {
                    Err(Error::driver(name.clone(), format!("{} panicked", action)))
                });
                (name, result)
            })
            .collect()
    })
}

/// Load `names`, run `action` on all of them and save them back.
///
/// Load failures and action failures are all reported together.
pub fn run_action(client: &Client, action: HostAction, names: &[String]) -> Result<()> {
    let mut hosts = Vec::new();
    let mut errors = Vec::new();

    for name in target_hosts(client, names)? {
        match client.load(&name) {
            Ok(host) => hosts.push(host),
            Err(e) => errors.push(e.to_string()),
        }
    }

    for (name, result) in run_action_for_each(action, &mut hosts, client.context()) {
        if let Err(e) = result {
            tracing::warn!(machine = %name, action = %action, error = %e, "action failed");
            errors.push(format!("error running {} on {:?}: {}", action, name, e));
        }
    }

    for host in &mut hosts {
        if let Err(e) = client.save(host) {
            errors.push(format!("error saving {:?}: {}", host.name, e));
        }
    }

    consolidate_errors(errors)
}

/// Fold messages into one newline-joined error, or `Ok` if there are none.
pub fn consolidate_errors(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Batch(errors))
    }
}

/// Remove hosts: the machine through its driver, then the local record.
///
/// The local record is removed when the machine removal succeeded, or
/// always when `force` is set. Without `force` every failure is
/// aggregated into the returned error; with `force` failures are only
/// logged. Returns the names whose local record was removed.
///
/// Names outside the host name grammar are rejected before anything is
/// removed, even with `force`.
pub fn remove_hosts(client: &Client, names: &[String], force: bool) -> Result<Vec<String>> {
    if let Some(bad) = names.iter().find(|name| !validate_host_name(name)) {
        return Err(Error::InvalidHostName(bad.clone()));
    }

    let mut removed = Vec::new();
    let mut errors = Vec::new();

    for name in names {
        let remote = client.load(name).and_then(|mut host| host.remove());

        if let Err(e) = &remote {
            errors.push(format!("error removing host {:?}: {}", name, e));
        }

        if remote.is_ok() || force {
            match client.remove(name) {
                Ok(()) => {
                    tracing::info!(machine = %name, "removed");
                    removed.push(name.clone());
                }
                Err(e) => errors.push(format!("can't remove {:?}: {}", name, e)),
            }
        }
    }

    if force {
        for message in &errors {
            tracing::warn!("{}", message);
        }
        return Ok(removed);
    }

    consolidate_errors(errors).map(|()| removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consolidate_errors_joins_with_newlines() {
        assert!(consolidate_errors(Vec::new()).is_ok());

        let err = consolidate_errors(vec!["a failed".into(), "b failed".into()]).unwrap_err();
        assert_eq!(err.to_string(), "a failed\nb failed");
    }

    #[test]
    fn test_action_names() {
        assert_eq!(HostAction::ConfigureAllAuth.to_string(), "regenerate certificates");
        assert_eq!(HostAction::Kill.as_str(), "kill");
    }
}
