//! Step coordinates: which swept parameter values produced a run.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RawError;

/// The value a swept parameter took for one run.
///
/// Numbers compare and hash by bit pattern so coordinates can key maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepValue {
  Number(f64),
  Text(String),
}

impl StepValue {
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      StepValue::Number(v) => Some(*v),
      StepValue::Text(_) => None,
    }
  }

  /// Parse a value as the simulator prints it: numeric when possible.
  pub fn parse(text: &str) -> Self {
    match text.parse::<f64>() {
      Ok(v) => StepValue::Number(v),
      Err(_) => StepValue::Text(text.to_string()),
    }
  }

  fn is_representable(&self) -> bool {
    match self {
      StepValue::Number(_) => true,
      StepValue::Text(text) => is_token(text) && text.parse::<f64>().is_err(),
    }
  }
}

impl PartialEq for StepValue {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (StepValue::Number(a), StepValue::Number(b)) => a.to_bits() == b.to_bits(),
      (StepValue::Text(a), StepValue::Text(b)) => a == b,
      _ => false,
    }
  }
}

impl Eq for StepValue {}

impl Hash for StepValue {
  fn hash<H: Hasher>(&self, state: &mut H) {
    match self {
      StepValue::Number(v) => {
        0u8.hash(state);
        v.to_bits().hash(state);
      }
      StepValue::Text(text) => {
        1u8.hash(state);
        text.hash(state);
      }
    }
  }
}

impl fmt::Display for StepValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StepValue::Number(v) => write!(f, "{v}"),
      StepValue::Text(text) => f.write_str(text),
    }
  }
}

impl From<f64> for StepValue {
  fn from(value: f64) -> Self {
    StepValue::Number(value)
  }
}

impl From<i32> for StepValue {
  fn from(value: i32) -> Self {
    StepValue::Number(f64::from(value))
  }
}

impl From<&str> for StepValue {
  fn from(value: &str) -> Self {
    StepValue::Text(value.to_string())
  }
}

impl From<String> for StepValue {
  fn from(value: String) -> Self {
    StepValue::Text(value)
  }
}

/// Ordered mapping from swept parameter name to value.
///
/// Order is the sweep declaration order and takes part in equality, so
/// `a=1 b=2` and `b=2 a=1` are different coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepCoordinate {
  entries: Vec<(String, StepValue)>,
}

impl StepCoordinate {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builder-style [`push`](Self::push).
  pub fn with(mut self, name: impl Into<String>, value: impl Into<StepValue>) -> Self {
    self.push(name, value);
    self
  }

  pub fn push(&mut self, name: impl Into<String>, value: impl Into<StepValue>) {
    self.entries.push((name.into(), value.into()));
  }

  pub fn get(&self, name: &str) -> Option<&StepValue> {
    self
      .entries
      .iter()
      .find(|(n, _)| n == name)
      .map(|(_, v)| v)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|(n, _)| n.as_str())
  }

  pub fn values(&self) -> impl Iterator<Item = &StepValue> {
    self.entries.iter().map(|(_, v)| v)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &StepValue)> {
    self.entries.iter().map(|(n, v)| (n.as_str(), v))
  }

  /// Number of parameters in the coordinate.
  pub fn arity(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// `self` followed by `inner`: an outer campaign coordinate refined by the
  /// steps a single simulator invocation swept internally.
  pub fn concat(&self, inner: &StepCoordinate) -> StepCoordinate {
    let mut entries = self.entries.clone();
    entries.extend(inner.entries.iter().cloned());
    StepCoordinate { entries }
  }

  /// Whether the coordinate survives a round trip through a `Step:` header line.
  pub(crate) fn is_representable(&self) -> bool {
    self
      .entries
      .iter()
      .all(|(name, value)| is_token(name) && value.is_representable())
  }
}

impl fmt::Display for StepCoordinate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, (name, value)) in self.entries.iter().enumerate() {
      if i > 0 {
        f.write_str(" ")?;
      }
      write!(f, "{name}={value}")?;
    }
    Ok(())
  }
}

impl FromStr for StepCoordinate {
  type Err = RawError;

  /// Parses `a=1 b=10 temp=25°C`.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut coordinate = StepCoordinate::new();
    for pair in s.split_whitespace() {
      let (name, value) = pair
        .split_once('=')
        .ok_or_else(|| RawError::format(format!("invalid step assignment '{pair}'")))?;
      if name.is_empty() || value.is_empty() {
        return Err(RawError::format(format!("invalid step assignment '{pair}'")));
      }
      coordinate.push(name, StepValue::parse(value));
    }
    Ok(coordinate)
  }
}

fn is_token(text: &str) -> bool {
  !text.is_empty() && !text.contains(|c: char| c.is_whitespace() || c == '=')
}
