//! JobPayload - レコードファイルの中身
//!
//! 任意の関数をシリアライズする代わりに、
//! 「登録済み task kind の名前」+「名前付き引数（JSON object）」を運ぶ。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::ValidationError;

/// Argument names injected by the worker at execution time.
pub const RESERVED_ARGS: [&str; 2] = ["job_id", "store"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    task: String,
    #[serde(default)]
    args: Map<String, Value>,
}

impl JobPayload {
    /// Build a payload, checking the argument shape.
    pub fn new(task: impl Into<String>, args: Value) -> Result<Self, ValidationError> {
        let args = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => return Err(ValidationError::ArgsNotObject(json_kind(&other))),
        };
        if let Some(reserved) = RESERVED_ARGS.iter().find(|name| args.contains_key(**name)) {
            return Err(ValidationError::ReservedArgument(reserved.to_string()));
        }
        Ok(Self {
            task: task.into(),
            args,
        })
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn args(&self) -> &Map<String, Value> {
        &self.args
    }

    /// Arguments as a JSON value, ready to be decoded into a typed task.
    pub fn args_value(&self) -> Value {
        Value::Object(self.args.clone())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
