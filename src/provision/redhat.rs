//! Red Hat family provisioners.

use super::systemd::{PackageManager, SystemdProvisioner};
use super::{Provisioner, Registry};
use crate::driver::Driver;
use crate::ssh::CommandChannel;
use std::sync::Arc;

/// Red Hat Enterprise Linux (`ID=rhel`).
pub fn new_redhat(driver: &dyn Driver, channel: Arc<dyn CommandChannel>) -> Box<dyn Provisioner> {
    Box::new(SystemdProvisioner::new(
        "redhat",
        "rhel",
        PackageManager::Yum,
        driver,
        channel,
    ))
}

/// CentOS (`ID=centos`).
pub fn new_centos(driver: &dyn Driver, channel: Arc<dyn CommandChannel>) -> Box<dyn Provisioner> {
    Box::new(SystemdProvisioner::new(
        "centos",
        "centos",
        PackageManager::Yum,
        driver,
        channel,
    ))
}

/// Fedora (`ID=fedora`).
pub fn new_fedora(driver: &dyn Driver, channel: Arc<dyn CommandChannel>) -> Box<dyn Provisioner> {
    Box::new(SystemdProvisioner::new(
        "fedora",
        "fedora",
        PackageManager::Dnf,
        driver,
        channel,
    ))
}

/// Register the Red Hat family.
pub fn register_defaults(registry: &mut Registry) {
    registry.register("RedHat", new_redhat);
    registry.register("Centos", new_centos);
    registry.register("Fedora", new_fedora);
}
