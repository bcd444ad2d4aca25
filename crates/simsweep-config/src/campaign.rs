use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::value::ValueDef;

/// A sweep campaign over one netlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignDef {
  pub name: String,
  pub netlist: PathBuf,
  /// One task per coordinate. Absent means a single task.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sweep: Option<SweepDef>,
  /// Steps the netlist runs internally (`.step`); every task produces one
  /// run per coordinate, in this order.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub steps: Option<SweepDef>,
  #[serde(default)]
  pub flags: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SweepDef {
  /// Hand-specified tuples, used in order.
  List {
    parameters: Vec<String>,
    points: Vec<Vec<ValueDef>>,
  },
  /// Cartesian product; the first axis varies slowest.
  Product { axes: Vec<AxisDef> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisDef {
  pub name: String,
  pub values: AxisValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisValues {
  List(Vec<ValueDef>),
  Range(RangeDef),
}

/// Generated axis values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "range", rename_all = "snake_case")]
pub enum RangeDef {
  Linear { start: f64, stop: f64, step: f64 },
  LinearCount { start: f64, stop: f64, count: u32 },
  Geometric { start: f64, stop: f64, factor: f64 },
  GeometricCount { start: f64, stop: f64, count: u32 },
}
