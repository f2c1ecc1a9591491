//! Typed access to the loosely-typed argument bag.
//!
//! Callers are not trusted to send well-typed values, so every accessor
//! checks the JSON type and names the offending argument on failure.

use domain::{Money, OrderStatus};
use serde_json::{Map, Value};

use super::error::{GatewayError, Result};

/// A view over one JSON object of arguments.
#[derive(Debug, Clone, Copy)]
pub struct Arguments<'a> {
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Arguments<'a> {
    /// Wraps the top-level bag. `null` is treated as an empty bag.
    pub fn root(value: &'a Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self { map: None }),
            Value::Object(map) => Ok(Self { map: Some(map) }),
            other => Err(GatewayError::invalid(
                "arguments",
                format!("expected an object, got {}", type_name(other)),
            )),
        }
    }

    /// Returns `input` when present, otherwise the bag itself.
    pub fn input(&self) -> Result<Self> {
        Ok(self.nested("input")?.unwrap_or(*self))
    }

    /// Returns `filter`, or an empty bag.
    pub fn filter(&self) -> Result<Self> {
        Ok(self.nested("filter")?.unwrap_or(Self { map: None }))
    }

    fn get(&self, name: &str) -> Option<&'a Value> {
        self.map
            .and_then(|m| m.get(name))
            .filter(|v| !v.is_null())
    }

    pub fn nested(&self, name: &str) -> Result<Option<Self>> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(Self { map: Some(map) })),
            Some(other) => Err(GatewayError::invalid(
                name,
                format!("expected an object, got {}", type_name(other)),
            )),
        }
    }

    pub fn string(&self, name: &str) -> Result<Option<String>> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(GatewayError::invalid(
                name,
                format!("expected a string, got {}", type_name(other)),
            )),
        }
    }

    pub fn required_string(&self, name: &str) -> Result<String> {
        let value = self
            .string(name)?
            .ok_or_else(|| GatewayError::MissingArgument(name.to_string()))?;
        if value.trim().is_empty() {
            return Err(GatewayError::invalid(name, "must not be empty"));
        }
        Ok(value)
    }

    /// Reads a non-negative whole number. `3.0` is accepted as `3`.
    pub fn count(&self, name: &str) -> Result<Option<u32>> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        let Some(n) = value.as_f64() else {
            return Err(GatewayError::invalid(
                name,
                format!("expected a number, got {}", type_name(value)),
            ));
        };
        if n < 0.0 {
            return Err(GatewayError::invalid(name, "must not be negative"));
        }
        if n.fract() != 0.0 || n > f64::from(u32::MAX) {
            return Err(GatewayError::invalid(name, format!("{n} is not a valid quantity")));
        }
        Ok(Some(n as u32))
    }

    pub fn required_count(&self, name: &str) -> Result<u32> {
        self.count(name)?
            .ok_or_else(|| GatewayError::MissingArgument(name.to_string()))
    }

    pub fn money(&self, name: &str) -> Result<Option<Money>> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        let Some(amount) = value.as_f64() else {
            return Err(GatewayError::invalid(
                name,
                format!("expected a number, got {}", type_name(value)),
            ));
        };
        Money::from_decimal(amount)
            .map(Some)
            .map_err(|e| GatewayError::invalid(name, e.to_string()))
    }

    pub fn required_money(&self, name: &str) -> Result<Money> {
        self.money(name)?
            .ok_or_else(|| GatewayError::MissingArgument(name.to_string()))
    }

    pub fn status(&self, name: &str) -> Result<Option<OrderStatus>> {
        match self.string(name)? {
            None => Ok(None),
            Some(s) => OrderStatus::parse(&s).map(Some).ok_or_else(|| {
                GatewayError::invalid(name, format!("'{s}' is not a valid order status"))
            }),
        }
    }

    /// Reads an array of objects.
    pub fn objects(&self, name: &str) -> Result<Vec<Arguments<'a>>> {
        let Some(value) = self.get(name) else {
            return Err(GatewayError::MissingArgument(name.to_string()));
        };
        let Value::Array(entries) = value else {
            return Err(GatewayError::invalid(
                name,
                format!("expected an array, got {}", type_name(value)),
            ));
        };
        entries
            .iter()
            .enumerate()
            .map(|(i, entry)| match entry {
                Value::Object(map) => Ok(Arguments { map: Some(map) }),
                other => Err(GatewayError::invalid(
                    format!("{name}[{i}]"),
                    format!("expected an object, got {}", type_name(other)),
                )),
            })
            .collect()
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
