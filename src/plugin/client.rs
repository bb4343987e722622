//! Host-side connection to a driver plugin.

use crate::error::{Error, Result};
use podmachine_protocol::{
    codes, read_frame, write_message, PluginRequest, PluginResponse, PROTOCOL_VERSION,
};
use serde::de::DeserializeOwned;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

/// Client for one plugin connection.
///
/// Requests are strictly request/response. Transport failures surface as
/// [`Error::PluginTransport`] naming the driver.
pub struct PluginClient {
    driver: String,
    stream: UnixStream,
}

impl PluginClient {
    /// Connect to a plugin via its Unix socket.
    pub fn connect(driver: impl Into<String>, socket_path: impl AsRef<Path>) -> Result<Self> {
        let driver = driver.into();
        let stream = UnixStream::connect(socket_path.as_ref())
            .map_err(|e| Error::transport(&driver, format!("failed to connect: {}", e)))?;
        Ok(Self::from_stream(driver, stream))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(driver: impl Into<String>, stream: UnixStream) -> Self {
        // Driver operations such as create can take minutes, so only writes
        // are bounded.
        stream.set_write_timeout(Some(Duration::from_secs(10))).ok();
        Self {
            driver: driver.into(),
            stream,
        }
    }

    /// Driver family served by this connection.
    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// Bound how long a reply may take.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) {
        self.stream.set_read_timeout(timeout).ok();
    }

    /// Send a request and receive a response.
    pub fn request(&mut self, req: &PluginRequest) -> Result<PluginResponse> {
        tracing::trace!(driver = %self.driver, method = req.method(), "plugin request");

        write_message(&mut self.stream, req)
            .map_err(|e| Error::transport(&self.driver, format!("write failed: {}", e)))?;

        self.read_response()
    }

    /// Read a response from the stream.
    fn read_response(&mut self) -> Result<PluginResponse> {
        let frame = read_frame(&mut self.stream)
            .map_err(|e| Error::transport(&self.driver, format!("read failed: {}", e)))?
            .ok_or_else(|| Error::transport(&self.driver, "plugin closed the connection"))?;

        serde_json::from_slice(&frame)
            .map_err(|e| Error::transport(&self.driver, format!("parse failed: {}", e)))
    }

    /// Send a request and return its data, mapping plugin errors.
    pub fn call(&mut self, req: &PluginRequest) -> Result<Option<serde_json::Value>> {
        match self.request(req)? {
            PluginResponse::Ok { data } => Ok(data),
            PluginResponse::Error { message, code } => {
                if code.as_deref() == Some(codes::NOT_SUPPORTED) {
                    Err(Error::not_supported(&self.driver, req.method()))
                } else {
                    Err(Error::driver(&self.driver, message))
                }
            }
            PluginResponse::Handshake { .. } => Err(Error::transport(
                &self.driver,
                format!("unexpected handshake reply to {}", req.method()),
            )),
        }
    }

    /// Send a request and decode its data as `T`.
    pub fn call_as<T: DeserializeOwned>(&mut self, req: &PluginRequest) -> Result<T> {
        let data = self.call(req)?.ok_or_else(|| {
            Error::transport(&self.driver, format!("{} returned no data", req.method()))
        })?;
        serde_json::from_value(data).map_err(|e| {
            Error::transport(&self.driver, format!("{} returned bad data: {}", req.method(), e))
        })
    }

    /// Negotiate the protocol version.
    pub fn handshake(&mut self) -> Result<()> {
        let resp = self.request(&PluginRequest::Handshake {
            protocol_version: PROTOCOL_VERSION,
        })?;

        match resp {
            PluginResponse::Handshake {
                protocol_version,
                driver_name,
            } => {
                if protocol_version != PROTOCOL_VERSION {
                    return Err(Error::handshake(
                        &self.driver,
                        format!(
                            "protocol version mismatch: host speaks {}, plugin speaks {}",
                            PROTOCOL_VERSION, protocol_version
                        ),
                    ));
                }
                if driver_name != self.driver {
                    return Err(Error::handshake(
                        &self.driver,
                        format!("plugin serves driver {:?}", driver_name),
                    ));
                }
                Ok(())
            }
            PluginResponse::Error { message, .. } => Err(Error::handshake(&self.driver, message)),
            PluginResponse::Ok { .. } => Err(Error::handshake(
                &self.driver,
                "plugin did not answer the handshake",
            )),
        }
    }

    /// Restore the plugin's driver state from `raw`.
    pub fn set_config_raw(&mut self, raw: &[u8]) -> Result<()> {
        let resp = self.request(&PluginRequest::SetConfigRaw {
            raw: podmachine_protocol::encode_raw(raw),
        })?;

        match resp {
            PluginResponse::Ok { .. } => Ok(()),
            PluginResponse::Error { message, .. } => Err(Error::handshake(
                &self.driver,
                format!("configuration rejected: {}", message),
            )),
            PluginResponse::Handshake { .. } => Err(Error::handshake(
                &self.driver,
                "unexpected handshake reply to set_config_raw",
            )),
        }
    }

    /// Ask the plugin to exit.
    pub fn close(&mut self) -> Result<()> {
        self.call(&PluginRequest::Close).map(|_| ())
    }
}
