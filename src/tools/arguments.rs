//! Typed access to function call arguments.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{KestrelError, Result};

/// Arguments of one function call, as emitted by the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments {
    value: Value,
}

impl ToolArguments {
    /// Wrap raw arguments. Some models send the object as a JSON string;
    /// such strings are parsed, and empty ones become `{}`.
    pub fn new(value: Value) -> Self {
        let value = match value {
            Value::String(raw) if raw.trim().is_empty() => Value::Object(Default::default()),
            Value::String(raw) => serde_json::from_str(raw.trim()).unwrap_or(Value::String(raw)),
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        Self { value }
    }

    pub fn raw(&self) -> &Value {
        &self.value
    }

    pub fn into_raw(self) -> Value {
        self.value
    }

    pub fn contains(&self, key: &str) -> bool {
        self.value.get(key).is_some()
    }

    /// Deserialize one argument; missing or mistyped values are errors.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .value
            .get(key)
            .ok_or_else(|| KestrelError::InvalidArgument(format!("missing argument `{key}`")))?;
        serde_json::from_value(value.clone()).map_err(|e| {
            KestrelError::InvalidArgument(format!("argument `{key}` has the wrong shape: {e}"))
        })
    }

    /// Deserialize one argument; missing, null or mistyped values are `None`.
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.value
            .get(key)
            .filter(|value| !value.is_null())
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.value.get(key).and_then(Value::as_str).ok_or_else(|| {
            KestrelError::InvalidArgument(format!("missing string argument `{key}`"))
        })
    }

    pub fn get_f64(&self, key: &str) -> Result<f64> {
        self.value.get(key).and_then(Value::as_f64).ok_or_else(|| {
            KestrelError::InvalidArgument(format!("missing number argument `{key}`"))
        })
    }

    pub fn get_i64(&self, key: &str) -> Result<i64> {
        self.value.get(key).and_then(Value::as_i64).ok_or_else(|| {
            KestrelError::InvalidArgument(format!("missing integer argument `{key}`"))
        })
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.value.get(key).and_then(Value::as_bool).ok_or_else(|| {
            KestrelError::InvalidArgument(format!("missing boolean argument `{key}`"))
        })
    }

    /// Deserialize all arguments into one typed struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            KestrelError::InvalidArgument(format!("failed to deserialize arguments: {e}"))
        })
    }
}

impl From<Value> for ToolArguments {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn string_encoded_arguments_are_parsed() {
        let args = ToolArguments::new(json!(r#"{"city": "Oslo"}"#));
        assert_eq!(args.get_str("city").unwrap(), "Oslo");
        assert_eq!(ToolArguments::new(json!("  ")).raw(), &json!({}));
        assert_eq!(ToolArguments::new(Value::Null).raw(), &json!({}));
    }

    #[test]
    fn typed_access() {
        let args = ToolArguments::new(json!({"a": 2, "b": 3.5, "ok": true, "tags": ["x"]}));
        assert_eq!(args.get_i64("a").unwrap(), 2);
        assert_eq!(args.get_f64("b").unwrap(), 3.5);
        assert!(args.get_bool("ok").unwrap());
        assert_eq!(args.get::<Vec<String>>("tags").unwrap(), vec!["x".to_string()]);
        assert_eq!(args.get_opt::<String>("missing"), None);
        assert!(matches!(
            args.get_str("a"),
            Err(KestrelError::InvalidArgument(_))
        ));
    }

    #[test]
    fn deserialize_whole_object() {
        #[derive(Deserialize)]
        struct Add {
            a: i64,
            b: i64,
        }
        let add: Add = ToolArguments::new(json!({"a": 1, "b": 2}))
            .deserialize()
            .unwrap();
        assert_eq!(add.a + add.b, 3);
    }
}
