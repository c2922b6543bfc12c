use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::str::FromStr;
use thiserror::Error;

use crate::Id;

pub const VALIDATION_FAILED: &str = "Validation failed";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}: {}", errors.join("; "))]
pub struct ValidationError {
    pub message: String,
    pub errors: Vec<String>,
}

impl ValidationError {
    pub fn new(errors: Vec<String>) -> Self {
        Self {
            message: VALIDATION_FAILED.to_string(),
            errors,
        }
    }

    pub fn single(error: impl Into<String>) -> Self {
        Self::new(vec![error.into()])
    }
}

/// Collects itemized field errors while reading a JSON object payload.
///
/// Unknown properties are reported up front, so a payload carrying fields
/// outside `allowed` never reaches the store.
pub struct FieldReader<'a> {
    fields: &'a Map<String, Value>,
    errors: Vec<String>,
}

impl<'a> FieldReader<'a> {
    pub fn new(payload: &'a Value, allowed: &[&str]) -> Result<Self, ValidationError> {
        let Some(fields) = payload.as_object() else {
            return Err(ValidationError::single("payload must be a JSON object"));
        };
        let errors = fields
            .keys()
            .filter(|key| !allowed.contains(&key.as_str()))
            .map(|key| format!("property {key} should not exist"))
            .collect();
        Ok(Self { fields, errors })
    }

    fn present(&self, field: &str) -> Option<&'a Value> {
        self.fields.get(field).filter(|value| !value.is_null())
    }

    pub fn required_string(&mut self, field: &str, max_len: usize) -> Option<String> {
        match self.present(field) {
            None => {
                self.errors.push(format!("{field} should not be empty"));
                None
            }
            Some(_) => self.optional_string(field, max_len),
        }
    }

    pub fn optional_string(&mut self, field: &str, max_len: usize) -> Option<String> {
        let value = self.present(field)?;
        let Some(text) = value.as_str() else {
            self.errors.push(format!("{field} must be a string"));
            return None;
        };
        if text.trim().is_empty() {
            self.errors.push(format!("{field} should not be empty"));
            return None;
        }
        if text.chars().count() > max_len {
            self.errors.push(format!(
                "{field} must be shorter than or equal to {max_len} characters"
            ));
            return None;
        }
        Some(text.to_string())
    }

    pub fn required_int(&mut self, field: &str, min: Option<i64>) -> Option<i64> {
        match self.present(field) {
            None => {
                self.errors.push(format!("{field} should not be empty"));
                None
            }
            Some(_) => self.optional_int(field, min),
        }
    }

    pub fn optional_int(&mut self, field: &str, min: Option<i64>) -> Option<i64> {
        let value = self.present(field)?;
        let Some(number) = value.as_i64() else {
            self.errors.push(format!("{field} must be an integer number"));
            return None;
        };
        if let Some(min) = min {
            if number < min {
                self.errors
                    .push(format!("{field} must not be less than {min}"));
                return None;
            }
        }
        Some(number)
    }

    pub fn required_enum<T: FromStr>(&mut self, field: &str, allowed: &[&str]) -> Option<T> {
        let Some(value) = self.present(field) else {
            self.errors.push(format!("{field} should not be empty"));
            return None;
        };
        match value.as_str().map(str::parse::<T>) {
            Some(Ok(parsed)) => Some(parsed),
            _ => {
                self.errors.push(format!(
                    "{field} must be one of the following values: {}",
                    allowed.join(", ")
                ));
                None
            }
        }
    }

    pub fn required_timestamp(&mut self, field: &str) -> Option<DateTime<Utc>> {
        let Some(value) = self.present(field) else {
            self.errors.push(format!("{field} should not be empty"));
            return None;
        };
        let parsed = value
            .as_str()
            .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
            .map(|timestamp| timestamp.with_timezone(&Utc));
        if parsed.is_none() {
            self.errors
                .push(format!("{field} must be a valid ISO 8601 date string"));
        }
        parsed
    }

    pub fn reject(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn finish(self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(self.errors))
        }
    }
}

/// Parses a path or query identifier, which must be an integer of at least 1.
pub fn parse_id(field: &str, raw: Option<&str>) -> Result<Id, ValidationError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Err(ValidationError::single(format!("{field} should not be empty")));
    };
    let id = raw
        .parse::<Id>()
        .map_err(|_| ValidationError::single(format!("{field} must be an integer number")))?;
    if id < 1 {
        return Err(ValidationError::single(format!(
            "{field} must not be less than 1"
        )));
    }
    Ok(id)
}
