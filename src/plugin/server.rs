//! Plugin-side request loop.
//!
//! Plugin binaries call [`serve`] with their family name and a function
//! that builds the driver from its raw configuration.

use crate::driver::{Driver, DriverOptions};
use crate::error::{Error, Result};
use podmachine_protocol::{
    codes, env, read_frame, write_message, PluginRequest, PluginResponse, PROTOCOL_VERSION,
};
use serde::Serialize;
use std::io::{Read, Write};
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Builds a driver from its raw configuration.
pub type DriverBuilder<'a> = dyn Fn(&[u8]) -> Result<Box<dyn Driver>> + 'a;

/// Serve one host connection on the socket named by the environment.
pub fn serve<F>(name: &str, build: F) -> Result<()>
where
    F: Fn(&[u8]) -> Result<Box<dyn Driver>>,
{
    let socket = std::env::var_os(env::SOCKET)
        .map(PathBuf::from)
        .ok_or_else(|| {
            Error::Config(format!(
                "{} is not set; driver plugins are started by podmachine",
                env::SOCKET
            ))
        })?;

    let _ = std::fs::remove_file(&socket);
    let listener = UnixListener::bind(&socket)?;
    info!(driver = name, socket = %socket.display(), "plugin listening");

    let (mut stream, _) = listener.accept()?;
    debug!("accepted connection");

    let result = serve_connection(name, &mut stream, &build);
    let _ = std::fs::remove_file(&socket);
    result
}

/// Handle requests on one connection until the host closes it.
pub fn serve_connection<S: Read + Write>(
    name: &str,
    stream: &mut S,
    build: &DriverBuilder<'_>,
) -> Result<()> {
    let mut session = Session {
        name,
        build,
        driver: None,
    };

    loop {
        let frame = match read_frame(stream)? {
            Some(frame) => frame,
            None => {
                debug!("connection closed");
                return Ok(());
            }
        };

        let request: PluginRequest = match serde_json::from_slice(&frame) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "invalid request");
                write_message(
                    stream,
                    &PluginResponse::error(format!("invalid request: {}", e), codes::INVALID_REQUEST),
                )?;
                continue;
            }
        };

        debug!(method = request.method(), "received request");

        let close = matches!(request, PluginRequest::Close);
        let response = session.handle(request);
        write_message(stream, &response)?;

        if close {
            info!("close requested");
            return Ok(());
        }
    }
}

struct Session<'a> {
    name: &'a str,
    build: &'a DriverBuilder<'a>,
    driver: Option<Box<dyn Driver>>,
}

impl Session<'_> {
    fn handle(&mut self, request: PluginRequest) -> PluginResponse {
        match request {
            PluginRequest::Handshake { protocol_version } => {
                if protocol_version != PROTOCOL_VERSION {
                    warn!(
                        host = protocol_version,
                        plugin = PROTOCOL_VERSION,
                        "protocol version mismatch"
                    );
                }
                PluginResponse::Handshake {
                    protocol_version: PROTOCOL_VERSION,
                    driver_name: self.name.to_string(),
                }
            }

            PluginRequest::SetConfigRaw { raw } => {
                let raw = match podmachine_protocol::decode_raw(&raw) {
                    Ok(raw) => raw,
                    Err(e) => {
                        return PluginResponse::error(
                            format!("raw config is not base64: {}", e),
                            codes::INVALID_CONFIG,
                        )
                    }
                };
                match (self.build)(&raw) {
                    Ok(driver) => {
                        self.driver = Some(driver);
                        PluginResponse::ok()
                    }
                    Err(e) => PluginResponse::error(e.to_string(), codes::INVALID_CONFIG),
                }
            }

            PluginRequest::Close => PluginResponse::ok(),

            request => match self.driver.as_mut() {
                Some(driver) => dispatch(driver.as_mut(), request),
                None => PluginResponse::error(
                    format!("{} before set_config_raw", request.method()),
                    codes::NOT_CONFIGURED,
                ),
            },
        }
    }
}

fn dispatch(driver: &mut dyn Driver, request: PluginRequest) -> PluginResponse {
    match request {
        PluginRequest::GetConfigRaw => {
            reply(driver.raw_config().map(|raw| podmachine_protocol::encode_raw(&raw)))
        }
        PluginRequest::GetMachineName => reply(Ok(driver.machine_name())),
        PluginRequest::GetCreateFlags => reply(driver.create_flags()),
        PluginRequest::SetConfigFromFlags { flags } => {
            done(driver.set_config_from_flags(&DriverOptions::new(flags)))
        }
        PluginRequest::PreCreateCheck => done(driver.pre_create_check()),
        PluginRequest::Create => done(driver.create()),
        PluginRequest::Start => done(driver.start()),
        PluginRequest::Stop => done(driver.stop()),
        PluginRequest::Restart => done(driver.restart()),
        PluginRequest::Kill => done(driver.kill()),
        PluginRequest::Remove => done(driver.remove()),
        PluginRequest::GetState => reply(driver.state().map(|s| s.to_string())),
        PluginRequest::GetUrl => reply(driver.url()),
        PluginRequest::GetIp => reply(driver.ip()),
        PluginRequest::GetSshHostname => reply(driver.ssh_hostname()),
        PluginRequest::GetSshPort => reply(driver.ssh_port()),
        PluginRequest::GetSshUsername => reply(driver.ssh_username()),
        PluginRequest::GetSshKeyPath => reply(
            driver
                .ssh_key_path()
                .map(|p| p.map(|p| p.display().to_string())),
        ),
        PluginRequest::Handshake { .. } | PluginRequest::SetConfigRaw { .. } | PluginRequest::Close => {
            PluginResponse::error("not a driver capability", codes::INVALID_REQUEST)
        }
    }
}

fn reply<T: Serialize>(result: Result<T>) -> PluginResponse {
    match result.and_then(|value| Ok(serde_json::to_value(value)?)) {
        Ok(data) => PluginResponse::with_data(data),
        Err(e) => failure(e),
    }
}

fn done(result: Result<()>) -> PluginResponse {
    match result {
        Ok(()) => PluginResponse::ok(),
        Err(e) => failure(e),
    }
}

fn failure(err: Error) -> PluginResponse {
    match err {
        Error::NotSupported { operation, .. } => {
            PluginResponse::error(format!("{} is not supported", operation), codes::NOT_SUPPORTED)
        }
        // The host re-attaches the driver name.
        Error::Driver { message, .. } => PluginResponse::error(message, codes::DRIVER_ERROR),
        other => PluginResponse::error(other.to_string(), codes::DRIVER_ERROR),
    }
}
