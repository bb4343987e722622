//! Protocol types for podmachine driver plugins.
//!
//! This crate defines the wire protocol spoken between the podmachine host
//! process and out-of-process driver plugins (`podmachine-driver-<name>`).
//!
//! # Protocol Overview
//!
//! The host spawns the plugin with [`env::SOCKET`] pointing at a Unix socket
//! path. The plugin binds that path and accepts a single connection. Every
//! message is JSON prefixed with a 4-byte big-endian length header.
//!
//! ```text
//! +----------------+-------------------+
//! | Length (4 BE)  | JSON payload      |
//! +----------------+-------------------+
//! ```
//!
//! The first exchange on a connection is always [`PluginRequest::Handshake`],
//! followed by [`PluginRequest::SetConfigRaw`]. After that every request maps
//! to one driver capability and receives exactly one response.

#![deny(missing_docs)]

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};

/// Protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum frame size (16 MB).
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Environment variables understood by plugins.
pub mod env {
    /// Path of the Unix socket the plugin must listen on.
    pub const SOCKET: &str = "PODMACHINE_PLUGIN_SOCKET";
}

/// Error codes carried by [`PluginResponse::Error`].
pub mod codes {
    /// The request could not be parsed.
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    /// A capability call arrived before `SetConfigRaw`.
    pub const NOT_CONFIGURED: &str = "NOT_CONFIGURED";
    /// The raw driver configuration was rejected.
    pub const INVALID_CONFIG: &str = "INVALID_CONFIG";
    /// The driver does not implement the requested operation.
    pub const NOT_SUPPORTED: &str = "NOT_SUPPORTED";
    /// The driver reported a failure.
    pub const DRIVER_ERROR: &str = "DRIVER_ERROR";
}

/// Values for driver create flags, keyed by flag name.
pub type FlagValues = BTreeMap<String, serde_json::Value>;

// ============================================================================
// Plugin Protocol
// ============================================================================

/// Requests sent from the host to a driver plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PluginRequest {
    /// Protocol negotiation. Must be the first request.
    Handshake {
        /// Protocol version spoken by the host.
        protocol_version: u32,
    },

    /// Restore the driver's internal state from its serialized form.
    SetConfigRaw {
        /// Base64 encoded opaque configuration blob.
        raw: String,
    },

    /// Serialize the driver's internal state.
    GetConfigRaw,

    /// Name of the machine this driver controls.
    GetMachineName,

    /// Flags the driver accepts at creation time.
    GetCreateFlags,

    /// Apply flag values gathered by the host.
    SetConfigFromFlags {
        /// Flag values by name.
        flags: FlagValues,
    },

    /// Validate that creation can succeed before any side effect.
    PreCreateCheck,

    /// Create the machine.
    Create,

    /// Start the machine.
    Start,

    /// Gracefully stop the machine.
    Stop,

    /// Restart the machine.
    Restart,

    /// Forcefully stop the machine.
    Kill,

    /// Destroy the machine and its resources.
    Remove,

    /// Current machine state.
    GetState,

    /// Engine URL.
    GetUrl,

    /// Machine IP address.
    GetIp,

    /// Host name or address used for SSH.
    GetSshHostname,

    /// Port used for SSH.
    GetSshPort,

    /// User name used for SSH.
    GetSshUsername,

    /// Private key used for SSH, if any.
    GetSshKeyPath,

    /// Close the connection and exit the plugin.
    Close,
}

impl PluginRequest {
    /// Short method name used in logs and error messages.
    pub fn method(&self) -> &'static str {
        match self {
            PluginRequest::Handshake { .. } => "handshake",
            PluginRequest::SetConfigRaw { .. } => "set_config_raw",
            PluginRequest::GetConfigRaw => "get_config_raw",
            PluginRequest::GetMachineName => "get_machine_name",
            PluginRequest::GetCreateFlags => "get_create_flags",
            PluginRequest::SetConfigFromFlags { .. } => "set_config_from_flags",
            PluginRequest::PreCreateCheck => "pre_create_check",
            PluginRequest::Create => "create",
            PluginRequest::Start => "start",
            PluginRequest::Stop => "stop",
            PluginRequest::Restart => "restart",
            PluginRequest::Kill => "kill",
            PluginRequest::Remove => "remove",
            PluginRequest::GetState => "get_state",
            PluginRequest::GetUrl => "get_url",
            PluginRequest::GetIp => "get_ip",
            PluginRequest::GetSshHostname => "get_ssh_hostname",
            PluginRequest::GetSshPort => "get_ssh_port",
            PluginRequest::GetSshUsername => "get_ssh_username",
            PluginRequest::GetSshKeyPath => "get_ssh_key_path",
            PluginRequest::Close => "close",
        }
    }
}

/// Responses sent from a driver plugin to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PluginResponse {
    /// Operation completed successfully.
    Ok {
        /// Response data (varies by request type).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },

    /// Reply to a handshake.
    Handshake {
        /// Protocol version spoken by the plugin.
        protocol_version: u32,
        /// Driver family served by the plugin.
        driver_name: String,
    },

    /// Operation failed.
    Error {
        /// Error message.
        message: String,
        /// Error code (for programmatic handling).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl PluginResponse {
    /// Successful response without data.
    pub fn ok() -> Self {
        PluginResponse::Ok { data: None }
    }

    /// Successful response carrying a value.
    pub fn with_data(data: serde_json::Value) -> Self {
        PluginResponse::Ok { data: Some(data) }
    }

    /// Error response with a code.
    pub fn error(message: impl Into<String>, code: &str) -> Self {
        PluginResponse::Error {
            message: message.into(),
            code: Some(code.to_string()),
        }
    }
}

/// A flag a driver accepts at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CreateFlag {
    /// Boolean switch, false unless given.
    Bool {
        /// Flag name without leading dashes.
        name: String,
        /// Help text.
        usage: String,
        /// Environment variable that supplies a value.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        env_var: Option<String>,
    },

    /// Integer flag.
    Int {
        /// Flag name without leading dashes.
        name: String,
        /// Help text.
        usage: String,
        /// Environment variable that supplies a value.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        env_var: Option<String>,
        /// Default value.
        value: i64,
    },

    /// String flag.
    String {
        /// Flag name without leading dashes.
        name: String,
        /// Help text.
        usage: String,
        /// Environment variable that supplies a value.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        env_var: Option<String>,
        /// Default value.
        #[serde(default)]
        value: String,
    },

    /// Repeatable string flag.
    StringSlice {
        /// Flag name without leading dashes.
        name: String,
        /// Help text.
        usage: String,
        /// Environment variable that supplies a value.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        env_var: Option<String>,
        /// Default values.
        #[serde(default)]
        value: Vec<String>,
    },
}

impl CreateFlag {
    /// Flag name.
    pub fn name(&self) -> &str {
        match self {
            CreateFlag::Bool { name, .. }
            | CreateFlag::Int { name, .. }
            | CreateFlag::String { name, .. }
            | CreateFlag::StringSlice { name, .. } => name,
        }
    }

    /// Help text.
    pub fn usage(&self) -> &str {
        match self {
            CreateFlag::Bool { usage, .. }
            | CreateFlag::Int { usage, .. }
            | CreateFlag::String { usage, .. }
            | CreateFlag::StringSlice { usage, .. } => usage,
        }
    }

    /// Environment variable supplying a value, if any.
    pub fn env_var(&self) -> Option<&str> {
        match self {
            CreateFlag::Bool { env_var, .. }
            | CreateFlag::Int { env_var, .. }
            | CreateFlag::String { env_var, .. }
            | CreateFlag::StringSlice { env_var, .. } => env_var.as_deref(),
        }
    }

    /// Default value as JSON. Booleans default to `false`.
    pub fn default_value(&self) -> serde_json::Value {
        match self {
            CreateFlag::Bool { .. } => serde_json::Value::Bool(false),
            CreateFlag::Int { value, .. } => serde_json::Value::from(*value),
            CreateFlag::String { value, .. } => serde_json::Value::from(value.clone()),
            CreateFlag::StringSlice { value, .. } => serde_json::Value::from(value.clone()),
        }
    }
}

// ============================================================================
// Raw Configuration
// ============================================================================

/// Encode an opaque driver configuration blob for the wire.
pub fn encode_raw(raw: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(raw)
}

/// Decode an opaque driver configuration blob from the wire.
pub fn decode_raw(raw: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(raw)
}

// ============================================================================
// Wire Format Helpers
// ============================================================================

/// Encode a message to wire format (length-prefixed JSON).
pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    let len = json.len() as u32;

    let mut buf = Vec::with_capacity(4 + json.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&json);

    Ok(buf)
}

/// Decode a message from wire format.
pub fn decode_message<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    if data.len() < 4 {
        return Err(DecodeError::TooShort);
    }

    let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;

    if len > MAX_FRAME_SIZE as usize {
        return Err(DecodeError::TooLarge(len));
    }

    if data.len() < 4 + len {
        return Err(DecodeError::Incomplete {
            expected: len,
            got: data.len() - 4,
        });
    }

    serde_json::from_slice(&data[4..4 + len]).map_err(DecodeError::Json)
}

/// Write one framed message to a stream.
pub fn write_message<W: Write, T: Serialize>(stream: &mut W, msg: &T) -> io::Result<()> {
    let data = encode_message(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    stream.write_all(&data)?;
    stream.flush()
}

/// Read one frame payload from a stream.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly before a new
/// frame started.
pub fn read_frame<R: Read>(stream: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    match stream.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(header);
    if len > MAX_FRAME_SIZE {
        tracing::warn!(len, "rejecting oversized frame");
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            DecodeError::TooLarge(len as usize),
        ));
    }

    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf)?;
    Ok(Some(buf))
}

/// Error decoding a wire message.
#[derive(Debug)]
pub enum DecodeError {
    /// Data too short to contain length header.
    TooShort,
    /// Frame size exceeds maximum.
    TooLarge(usize),
    /// Incomplete frame.
    Incomplete {
        /// Expected length.
        expected: usize,
        /// Actual length.
        got: usize,
    },
    /// JSON parse error.
    Json(serde_json::Error),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::TooShort => write!(f, "data too short for length header"),
            DecodeError::TooLarge(size) => write!(f, "frame too large: {} bytes", size),
            DecodeError::Incomplete { expected, got } => {
                write!(f, "incomplete frame: expected {} bytes, got {}", expected, got)
            }
            DecodeError::Json(e) => write!(f, "JSON decode error: {}", e),
        }
    }
}

impl std::error::Error for DecodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_set_config_raw() {
        let req = PluginRequest::SetConfigRaw {
            raw: encode_raw(br#"{"MachineName":"dev"}"#),
        };

        let encoded = encode_message(&req).unwrap();
        let decoded: PluginRequest = decode_message(&encoded).unwrap();

        match decoded {
            PluginRequest::SetConfigRaw { raw } => {
                assert_eq!(decode_raw(&raw).unwrap(), br#"{"MachineName":"dev"}"#);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_decode_too_short() {
        let data = [0u8; 2];
        let result: Result<PluginRequest, _> = decode_message(&data);
        assert!(matches!(result, Err(DecodeError::TooShort)));
    }

    #[test]
    fn test_decode_incomplete() {
        let mut data = vec![0, 0, 0, 100]; // claims 100 bytes
        data.extend_from_slice(b"{}"); // only 2 bytes of payload
        let result: Result<PluginRequest, _> = decode_message(&data);
        assert!(matches!(result, Err(DecodeError::Incomplete { .. })));
    }

    #[test]
    fn test_read_frame_clean_eof() {
        let mut empty: &[u8] = &[];
        assert!(read_frame(&mut empty).unwrap().is_none());
    }

    #[test]
    fn test_read_frame_rejects_oversized() {
        let mut data: &[u8] = &[0xff, 0xff, 0xff, 0xff];
        let err = read_frame(&mut data).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_write_then_read_frame() {
        let mut buf = Vec::new();
        write_message(&mut buf, &PluginRequest::GetState).unwrap();

        let mut cursor = buf.as_slice();
        let frame = read_frame(&mut cursor).unwrap().unwrap();
        let req: PluginRequest = serde_json::from_slice(&frame).unwrap();
        assert_eq!(req.method(), "get_state");
    }

    #[test]
    fn test_request_serialization_uses_method_tag() {
        let json = serde_json::to_string(&PluginRequest::GetSshPort).unwrap();
        assert_eq!(json, r#"{"method":"get_ssh_port"}"#);

        let json = serde_json::to_string(&PluginRequest::Handshake {
            protocol_version: PROTOCOL_VERSION,
        })
        .unwrap();
        assert!(json.contains("handshake"));
    }

    #[test]
    fn test_response_error_carries_code() {
        let resp = PluginResponse::error("no such machine", codes::DRIVER_ERROR);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("DRIVER_ERROR"));

        let ok = serde_json::to_string(&PluginResponse::ok()).unwrap();
        assert_eq!(ok, r#"{"status":"ok"}"#);
    }

    #[test]
    fn test_create_flag_defaults() {
        let flag = CreateFlag::Bool {
            name: "generic-insecure".into(),
            usage: "skip checks".into(),
            env_var: None,
        };
        assert_eq!(flag.default_value(), serde_json::Value::Bool(false));

        let flag = CreateFlag::Int {
            name: "generic-ssh-port".into(),
            usage: "SSH port".into(),
            env_var: Some("GENERIC_SSH_PORT".into()),
            value: 22,
        };
        assert_eq!(flag.name(), "generic-ssh-port");
        assert_eq!(flag.env_var(), Some("GENERIC_SSH_PORT"));
        assert_eq!(flag.default_value(), serde_json::json!(22));
    }
}
