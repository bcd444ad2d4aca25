use serde::{Deserialize, Serialize};

/// A parameter value as written in JSON: a number or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueDef {
  Number(f64),
  Text(String),
}
