//! Extension settings
//!
//! Settings are passed around as plain strings and checked against the
//! [`SettingInfoDictionary`] each extension declares.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AudioError, Result};

/// Unrestricted, key-ordered string map of extension settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsDictionary {
    values: BTreeMap<String, String>,
}

impl SettingsDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a setting, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse `KEY=VALUE` pairs (as collected by the CLI)
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut settings = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair.split_once('=').ok_or_else(|| AudioError::InvalidSetting {
                key: pair.to_string(),
                reason: "expected KEY=VALUE".to_string(),
            })?;
            settings.insert(key.trim(), value.trim());
        }
        Ok(settings)
    }

    /// Check every setting against an extension's declared settings
    ///
    /// Fails with `InvalidSetting` naming the first key that is not declared
    /// or whose value does not validate.
    pub fn validate(&self, available: &SettingInfoDictionary) -> Result<()> {
        for (key, value) in self.iter() {
            let info = available.get(key).ok_or_else(|| AudioError::InvalidSetting {
                key: key.to_string(),
                reason: "not supported by this extension".to_string(),
            })?;
            info.validate(value)
                .map_err(|reason| AudioError::InvalidSetting {
                    key: key.to_string(),
                    reason,
                })?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SettingsDictionary {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut settings = Self::new();
        for (key, value) in iter {
            settings.insert(key, value);
        }
        settings
    }
}

/// Description of one accepted setting
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettingInfo {
    Integer { min: i64, max: i64 },
    Number { min: f64, max: f64 },
    Choice { values: Vec<String> },
    Boolean,
}

impl SettingInfo {
    pub fn choice<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SettingInfo::Choice {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Validate a raw value, returning the reason on failure
    pub fn validate(&self, value: &str) -> std::result::Result<(), String> {
        match self {
            SettingInfo::Integer { min, max } => {
                let parsed: i64 = value
                    .parse()
                    .map_err(|_| format!("'{value}' is not an integer"))?;
                if parsed < *min || parsed > *max {
                    return Err(format!("{parsed} is outside {min}..={max}"));
                }
                Ok(())
            }
            SettingInfo::Number { min, max } => {
                let parsed: f64 = value
                    .parse()
                    .map_err(|_| format!("'{value}' is not a number"))?;
                if !parsed.is_finite() || parsed < *min || parsed > *max {
                    return Err(format!("{value} is outside {min}..={max}"));
                }
                Ok(())
            }
            SettingInfo::Choice { values } => {
                if values.iter().any(|v| v.eq_ignore_ascii_case(value)) {
                    Ok(())
                } else {
                    Err(format!("expected one of: {}", values.join(", ")))
                }
            }
            SettingInfo::Boolean => match value.to_ascii_lowercase().as_str() {
                "true" | "false" => Ok(()),
                _ => Err(format!("'{value}' is not true/false")),
            },
        }
    }
}

/// The settings an extension accepts, keyed by setting name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SettingInfoDictionary {
    entries: BTreeMap<String, SettingInfo>,
}

impl SettingInfoDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, info: SettingInfo) -> Self {
        self.entries.insert(key.into(), info);
        self
    }

    pub fn get(&self, key: &str) -> Option<&SettingInfo> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingInfo)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}
