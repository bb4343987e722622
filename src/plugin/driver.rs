//! Driver that forwards every call to a plugin process.

use super::PluginClient;
use crate::driver::{CreateFlag, Driver, DriverOptions};
use crate::error::{Error, Result};
use crate::state::MachineState;
use parking_lot::Mutex;
use podmachine_protocol::PluginRequest;
use std::path::PathBuf;
use std::time::Duration;

/// [`Driver`] backed by a plugin connection.
pub struct RpcDriver {
    name: String,
    machine_name: String,
    client: Mutex<PluginClient>,
}

impl RpcDriver {
    /// Wrap a connection that has completed the handshake and received its
    /// raw configuration.
    pub fn new(mut client: PluginClient) -> Result<Self> {
        let name = client.driver().to_string();
        let machine_name: String = client.call_as(&PluginRequest::GetMachineName)?;
        Ok(Self {
            name,
            machine_name,
            client: Mutex::new(client),
        })
    }

    fn query<T: serde::de::DeserializeOwned>(&self, req: PluginRequest) -> Result<T> {
        self.client.lock().call_as(&req)
    }

    fn invoke(&mut self, req: PluginRequest) -> Result<()> {
        self.client.get_mut().call(&req).map(|_| ())
    }
}

impl Driver for RpcDriver {
    fn driver_name(&self) -> String {
        self.name.clone()
    }

    fn machine_name(&self) -> String {
        self.machine_name.clone()
    }

    fn create_flags(&self) -> Result<Vec<CreateFlag>> {
        self.query(PluginRequest::GetCreateFlags)
    }

    fn set_config_from_flags(&mut self, opts: &DriverOptions) -> Result<()> {
        self.invoke(PluginRequest::SetConfigFromFlags {
            flags: opts.values().clone(),
        })
    }

    fn pre_create_check(&mut self) -> Result<()> {
        self.invoke(PluginRequest::PreCreateCheck)
    }

    fn create(&mut self) -> Result<()> {
        self.invoke(PluginRequest::Create)
    }

    fn start(&mut self) -> Result<()> {
        self.invoke(PluginRequest::Start)
    }

    fn stop(&mut self) -> Result<()> {
        self.invoke(PluginRequest::Stop)
    }

    fn restart(&mut self) -> Result<()> {
        self.invoke(PluginRequest::Restart)
    }

    fn kill(&mut self) -> Result<()> {
        self.invoke(PluginRequest::Kill)
    }

    fn remove(&mut self) -> Result<()> {
        self.invoke(PluginRequest::Remove)
    }

    fn state(&self) -> Result<MachineState> {
        let state: String = self.query(PluginRequest::GetState)?;
        state.parse().map_err(|e: String| Error::driver(&self.name, e))
    }

    fn url(&self) -> Result<String> {
        self.query(PluginRequest::GetUrl)
    }

    fn ip(&self) -> Result<String> {
        self.query(PluginRequest::GetIp)
    }

    fn ssh_hostname(&self) -> Result<String> {
        self.query(PluginRequest::GetSshHostname)
    }

    fn ssh_port(&self) -> Result<u16> {
        self.query(PluginRequest::GetSshPort)
    }

    fn ssh_username(&self) -> Result<String> {
        self.query(PluginRequest::GetSshUsername)
    }

    fn ssh_key_path(&self) -> Result<Option<PathBuf>> {
        let path: Option<String> = self.query(PluginRequest::GetSshKeyPath)?;
        Ok(path.filter(|p| !p.is_empty()).map(PathBuf::from))
    }

    fn raw_config(&self) -> Result<Vec<u8>> {
        let raw: String = self.query(PluginRequest::GetConfigRaw)?;
        podmachine_protocol::decode_raw(&raw)
            .map_err(|e| Error::transport(&self.name, format!("bad raw config: {}", e)))
    }
}

impl Drop for RpcDriver {
    fn drop(&mut self) {
        let client = self.client.get_mut();
        client.set_read_timeout(Some(Duration::from_secs(2)));
        if let Err(e) = client.close() {
            tracing::debug!(driver = %self.name, error = %e, "plugin close failed");
        }
    }
}
