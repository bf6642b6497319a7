//! Keyed configuration access.

use std::str::FromStr;

use crate::domain::error::CandlebotError;

/// `[section] key = value` lookups. Absent keys are `Ok(None)`; a present
/// value that does not parse is [`CandlebotError::ConfigInvalid`].
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    fn require_string(&self, section: &str, key: &str) -> Result<String, CandlebotError> {
        self.get_string(section, key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| CandlebotError::ConfigMissing {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    fn get_f64(&self, section: &str, key: &str) -> Result<Option<f64>, CandlebotError> {
        parse_value(section, key, self.get_string(section, key), "a number")
    }

    fn get_u32(&self, section: &str, key: &str) -> Result<Option<u32>, CandlebotError> {
        parse_value(section, key, self.get_string(section, key), "a non-negative integer")
    }

    fn get_usize(&self, section: &str, key: &str) -> Result<Option<usize>, CandlebotError> {
        parse_value(section, key, self.get_string(section, key), "a non-negative integer")
    }

    fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>, CandlebotError> {
        match self.get_string(section, key) {
            None => Ok(None),
            Some(raw) => parse_bool(&raw).map(Some).ok_or_else(|| {
                CandlebotError::invalid(section, key, format!("expected true or false, got `{raw}`"))
            }),
        }
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

fn parse_value<T: FromStr>(
    section: &str,
    key: &str,
    raw: Option<String>,
    expected: &str,
) -> Result<Option<T>, CandlebotError> {
    match raw {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CandlebotError::invalid(section, key, format!("expected {expected}, got `{raw}`"))),
    }
}
