//! Flag values handed to drivers at creation time.

use crate::error::{Error, Result};
use podmachine_protocol::{CreateFlag, FlagValues};
use serde_json::Value;

/// Driver flag values keyed by flag name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverOptions {
    values: FlagValues,
}

impl DriverOptions {
    /// Wrap raw flag values.
    pub fn new(values: FlagValues) -> Self {
        Self { values }
    }

    /// Resolve values for `flags`.
    ///
    /// Precedence, lowest first: flag default, environment variable, then
    /// `overrides` given as `KEY=VALUE` (repeat a key to build a list).
    pub fn resolve(
        flags: &[CreateFlag],
        overrides: &[(String, String)],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut values = FlagValues::new();

        for flag in flags {
            let mut value = flag.default_value();

            if let Some(raw) = flag.env_var().and_then(&env) {
                value = parse_value(flag, &[raw])?;
            }

            let given: Vec<String> = overrides
                .iter()
                .filter(|(k, _)| k == flag.name())
                .map(|(_, v)| v.clone())
                .collect();
            if !given.is_empty() {
                value = parse_value(flag, &given)?;
            }

            values.insert(flag.name().to_string(), value);
        }

        for (key, _) in overrides {
            if !flags.iter().any(|f| f.name() == key) {
                return Err(Error::Config(format!("unknown driver option: {}", key)));
            }
        }

        Ok(Self { values })
    }

    /// Raw values for the wire.
    pub fn values(&self) -> &FlagValues {
        &self.values
    }

    /// Set a value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// String value, empty if absent.
    pub fn string(&self, name: &str) -> String {
        self.values
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// Integer value, zero if absent.
    pub fn int(&self, name: &str) -> i64 {
        self.values.get(name).and_then(Value::as_i64).unwrap_or(0)
    }

    /// Boolean value, false if absent.
    pub fn bool(&self, name: &str) -> bool {
        self.values
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// List value, empty if absent.
    pub fn string_slice(&self, name: &str) -> Vec<String> {
        self.values
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn parse_value(flag: &CreateFlag, raw: &[String]) -> Result<Value> {
    let last = raw.last().map(String::as_str).unwrap_or_default();
    match flag {
        CreateFlag::Bool { name, .. } => match last {
            "" | "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            other => Err(Error::Config(format!(
                "invalid boolean for {}: {}",
                name, other
            ))),
        },
        CreateFlag::Int { name, .. } => last
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| Error::Config(format!("invalid integer for {}: {}", name, last))),
        CreateFlag::String { .. } => Ok(Value::from(last)),
        CreateFlag::StringSlice { .. } => Ok(Value::from(
            raw.iter()
                .flat_map(|v| v.split(','))
                .filter(|v| !v.is_empty())
                .map(String::from)
                .collect::<Vec<_>>(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags() -> Vec<CreateFlag> {
        vec![
            CreateFlag::String {
                name: "generic-ssh-user".into(),
                usage: "SSH user".into(),
                env_var: Some("GENERIC_SSH_USER".into()),
                value: "root".into(),
            },
            CreateFlag::Int {
                name: "generic-ssh-port".into(),
                usage: "SSH port".into(),
                env_var: None,
                value: 22,
            },
            CreateFlag::Bool {
                name: "insecure".into(),
                usage: "skip checks".into(),
                env_var: None,
            },
            CreateFlag::StringSlice {
                name: "tags".into(),
                usage: "tags".into(),
                env_var: None,
                value: vec![],
            },
        ]
    }

    #[test]
    fn test_defaults_apply() {
        let opts = DriverOptions::resolve(&flags(), &[], |_| None).unwrap();
        assert_eq!(opts.string("generic-ssh-user"), "root");
        assert_eq!(opts.int("generic-ssh-port"), 22);
        assert!(!opts.bool("insecure"));
        assert!(opts.string_slice("tags").is_empty());
    }

    #[test]
    fn test_env_then_override_precedence() {
        let env = |key: &str| (key == "GENERIC_SSH_USER").then(|| "admin".to_string());
        let opts = DriverOptions::resolve(&flags(), &[], env).unwrap();
        assert_eq!(opts.string("generic-ssh-user"), "admin");

        let overrides = vec![("generic-ssh-user".to_string(), "core".to_string())];
        let opts = DriverOptions::resolve(&flags(), &overrides, env).unwrap();
        assert_eq!(opts.string("generic-ssh-user"), "core");
    }

    #[test]
    fn test_typed_overrides() {
        let overrides = vec![
            ("generic-ssh-port".to_string(), "2222".to_string()),
            ("insecure".to_string(), String::new()),
            ("tags".to_string(), "a,b".to_string()),
            ("tags".to_string(), "c".to_string()),
        ];
        let opts = DriverOptions::resolve(&flags(), &overrides, |_| None).unwrap();
        assert_eq!(opts.int("generic-ssh-port"), 2222);
        assert!(opts.bool("insecure"));
        assert_eq!(opts.string_slice("tags"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unknown_option_rejected() {
        let overrides = vec![("bogus".to_string(), "1".to_string())];
        let err = DriverOptions::resolve(&flags(), &overrides, |_| None).unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_bad_integer_rejected() {
        let overrides = vec![("generic-ssh-port".to_string(), "ssh".to_string())];
        assert!(DriverOptions::resolve(&flags(), &overrides, |_| None).is_err());
    }
}
