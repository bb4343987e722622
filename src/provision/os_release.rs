//! `/etc/os-release` parsing.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Parsed `/etc/os-release` key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsRelease {
    fields: BTreeMap<String, String>,
}

impl OsRelease {
    /// Parse os-release text.
    ///
    /// Blank lines and `#` comments are skipped. Every other line must be
    /// `KEY=VALUE`; surrounding single or double quotes are stripped from
    /// the value.
    pub fn parse(content: &str) -> Result<Self> {
        let mut fields = BTreeMap::new();

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::OsReleaseParse(format!("line {}: expected KEY=VALUE, got {:?}", lineno + 1, line))
            })?;

            let key = key.trim();
            if key.is_empty() {
                return Err(Error::OsReleaseParse(format!("line {}: empty key", lineno + 1)));
            }

            fields.insert(key.to_string(), unquote(value.trim()).to_string());
        }

        Ok(Self { fields })
    }

    /// Build from explicit pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Raw field lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// `ID`, empty if absent.
    pub fn id(&self) -> &str {
        self.get("ID").unwrap_or_default()
    }

    /// `ID_LIKE`, split on whitespace.
    pub fn id_like(&self) -> Vec<&str> {
        self.get("ID_LIKE")
            .map(|v| v.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// `NAME`, empty if absent.
    pub fn name(&self) -> &str {
        self.get("NAME").unwrap_or_default()
    }

    /// `VERSION`, empty if absent.
    pub fn version(&self) -> &str {
        self.get("VERSION").unwrap_or_default()
    }

    /// `VERSION_ID`, empty if absent.
    pub fn version_id(&self) -> &str {
        self.get("VERSION_ID").unwrap_or_default()
    }

    /// `PRETTY_NAME`, empty if absent.
    pub fn pretty_name(&self) -> &str {
        self.get("PRETTY_NAME").unwrap_or_default()
    }
}

impl fmt::Display for OsRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.pretty_name().is_empty() {
            write!(f, "{}", self.pretty_name())
        } else {
            write!(f, "{} {}", self.id(), self.version_id())
        }
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    const CENTOS: &str = r#"NAME="CentOS Linux"
VERSION="7 (Core)"
ID="centos"
ID_LIKE="rhel fedora"
VERSION_ID="7"
PRETTY_NAME="CentOS Linux 7 (Core)"
ANSI_COLOR="0;31"
CPE_NAME="cpe:/o:centos:centos:7"
HOME_URL="https://www.centos.org/"
BUG_REPORT_URL="https://bugs.centos.org/"
"#;

    #[test]
    fn test_parse_centos() {
        let info = OsRelease::parse(CENTOS).unwrap();
        assert_eq!(info.id(), "centos");
        assert_eq!(info.id_like(), vec!["rhel", "fedora"]);
        assert_eq!(info.version_id(), "7");
        assert_eq!(info.name(), "CentOS Linux");
        assert_eq!(info.get("HOME_URL"), Some("https://www.centos.org/"));
        assert_eq!(info.to_string(), "CentOS Linux 7 (Core)");
    }

    #[test]
    fn test_parse_skips_comments_and_unquoted_values() {
        let info = OsRelease::parse("# generated\n\nID=fedora\nVERSION_ID=29\nNAME='Fedora'\n").unwrap();
        assert_eq!(info.id(), "fedora");
        assert_eq!(info.version_id(), "29");
        assert_eq!(info.name(), "Fedora");
        assert!(info.id_like().is_empty());
    }

    #[test]
    fn test_value_may_contain_equals() {
        let info = OsRelease::parse("ID=rhel\nVARIANT=\"a=b\"\n").unwrap();
        assert_eq!(info.get("VARIANT"), Some("a=b"));
    }

    #[test]
    fn test_line_without_equals_fails() {
        let err = OsRelease::parse("ID=centos\ngarbage\n").unwrap_err();
        assert!(matches!(err, Error::OsReleaseParse(_)));
        assert!(err.to_string().contains("line 2"));
    }
}
