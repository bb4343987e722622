//! Collaborators shared by host operations.
//!
//! A [`Context`] is built once at process start and passed by reference to
//! every lifecycle verb. Tests build their own instead of mutating shared
//! state.

use crate::cert::{CertBootstrapper, FileCertBootstrapper};
use crate::driver::Driver;
use crate::error::Result;
use crate::provision::{redhat, Detector, Provisioner, Registry, StandardDetector};
use crate::ssh::{ChannelFactory, SshChannelFactory};
use crate::wait::WaitPolicy;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Provisioner registry, detection strategy, command channels, certificate
/// bootstrap and wait policy.
pub struct Context {
    /// Provisioners available to detection.
    pub registry: Registry,
    /// Provisioner selection strategy.
    pub detector: Box<dyn Detector>,
    /// Opens command channels to machines.
    pub channels: Arc<dyn ChannelFactory>,
    /// Validates certificate material.
    pub bootstrapper: Box<dyn CertBootstrapper>,
    /// Polling policy for state and readiness waits.
    pub wait: WaitPolicy,
}

impl Context {
    /// Default registry, standard detection and the system `ssh` client.
    pub fn standard() -> Self {
        let mut registry = Registry::new();
        redhat::register_defaults(&mut registry);

        Self {
            registry,
            detector: Box::new(StandardDetector),
            channels: Arc::new(SshChannelFactory),
            bootstrapper: Box::new(FileCertBootstrapper),
            wait: WaitPolicy::default(),
        }
    }

    /// Replace the wait policy.
    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    /// Pick a provisioner for the machine behind `driver`.
    pub fn detect_provisioner(&self, driver: &dyn Driver) -> Result<Box<dyn Provisioner>> {
        self.detector.detect(self, driver)
    }

    /// Swap in another detector until the returned guard is dropped.
    pub fn install_detector(&mut self, detector: Box<dyn Detector>) -> DetectorGuard<'_> {
        let previous = std::mem::replace(&mut self.detector, detector);
        DetectorGuard {
            ctx: self,
            previous: Some(previous),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("registry", &self.registry)
            .field("wait", &self.wait)
            .finish_non_exhaustive()
    }
}

/// Restores the previous detector on drop. Derefs to the context.
pub struct DetectorGuard<'a> {
    ctx: &'a mut Context,
    previous: Option<Box<dyn Detector>>,
}

impl Deref for DetectorGuard<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx
    }
}

impl DerefMut for DetectorGuard<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx
    }
}

impl Drop for DetectorGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.ctx.detector = previous;
        }
    }
}
