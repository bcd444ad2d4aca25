use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use simsweep_config::{AxisValues, CampaignDef, RangeDef, SweepDef, ValueDef};
use simsweep_queue::Task;
use simsweep_raw::StepValue;
use simsweep_steps::{StepError, Sweep, ranges};

use crate::error::EngineError;

/// A validated campaign: one task per coordinate of `sweep`, each running
/// the netlist's own `steps` internally.
#[derive(Debug, Clone, PartialEq)]
pub struct Campaign {
  pub name: String,
  pub netlist: PathBuf,
  pub sweep: Sweep,
  pub steps: Option<Sweep>,
  pub flags: Vec<String>,
  pub timeout: Option<Duration>,
}

impl Campaign {
  /// Relative netlist paths are resolved against `base_dir`, normally the
  /// directory of the campaign file.
  pub fn from_def(def: CampaignDef, base_dir: Option<&Path>) -> Result<Self, EngineError> {
    let sweep = match &def.sweep {
      Some(sweep) => sweep_from_def(sweep)?,
      None => Sweep::single(),
    };
    let steps = def.steps.as_ref().map(sweep_from_def).transpose()?;

    if sweep.is_empty() {
      return Err(EngineError::InvalidCampaign {
        message: format!("campaign '{}' has an empty sweep", def.name),
      });
    }
    if let Some(steps) = &steps {
      if steps.is_empty() {
        return Err(EngineError::InvalidCampaign {
          message: format!("campaign '{}' has empty steps", def.name),
        });
      }
      let outer: HashSet<&str> = sweep.parameters().iter().map(String::as_str).collect();
      if let Some(shared) = steps.parameters().iter().find(|p| outer.contains(p.as_str())) {
        return Err(EngineError::InvalidCampaign {
          message: format!("parameter '{shared}' is both swept and stepped"),
        });
      }
    }

    let netlist = match base_dir {
      Some(base) if def.netlist.is_relative() => base.join(&def.netlist),
      _ => def.netlist,
    };

    Ok(Self {
      name: def.name,
      netlist,
      sweep,
      steps,
      flags: def.flags,
      timeout: def.timeout_ms.map(Duration::from_millis),
    })
  }

  /// One task per sweep coordinate, in sweep order.
  pub fn tasks(&self) -> Vec<Task> {
    self
      .sweep
      .coordinates()
      .map(|coordinate| {
        let mut task = Task::new(self.netlist.clone(), coordinate).with_flags(self.flags.clone());
        if let Some(steps) = &self.steps {
          task = task.with_steps(steps.clone());
        }
        if let Some(timeout) = self.timeout {
          task = task.with_timeout(timeout);
        }
        task
      })
      .collect()
  }

  /// Number of runs the whole campaign produces.
  pub fn expected_runs(&self) -> usize {
    self.sweep.len() * self.steps.as_ref().map_or(1, Sweep::len)
  }
}

pub fn sweep_from_def(def: &SweepDef) -> Result<Sweep, StepError> {
  match def {
    SweepDef::List { parameters, points } => Sweep::from_points(
      parameters.clone(),
      points
        .iter()
        .map(|tuple| tuple.iter().map(step_value).collect())
        .collect(),
    ),
    SweepDef::Product { axes } => {
      let axes = axes
        .iter()
        .map(|axis| Ok((axis.name.clone(), axis_values(&axis.values)?)))
        .collect::<Result<Vec<_>, StepError>>()?;
      Sweep::cartesian(axes)
    }
  }
}

fn axis_values(values: &AxisValues) -> Result<Vec<StepValue>, StepError> {
  let numbers = match values {
    AxisValues::List(values) => return Ok(values.iter().map(step_value).collect()),
    AxisValues::Range(RangeDef::Linear { start, stop, step }) => ranges::linear(*start, *stop, *step)?,
    AxisValues::Range(RangeDef::LinearCount { start, stop, count }) => {
      ranges::linear_count(*start, *stop, *count)?
    }
    AxisValues::Range(RangeDef::Geometric {
      start,
      stop,
      factor,
    }) => ranges::geometric(*start, *stop, *factor)?,
    AxisValues::Range(RangeDef::GeometricCount { start, stop, count }) => {
      ranges::geometric_count(*start, *stop, *count)?
    }
  };
  Ok(numbers.into_iter().map(StepValue::Number).collect())
}

fn step_value(value: &ValueDef) -> StepValue {
  match value {
    ValueDef::Number(v) => StepValue::Number(*v),
    ValueDef::Text(text) => StepValue::parse(text),
  }
}

#[cfg(test)]
mod tests {
  use simsweep_raw::StepCoordinate;

  use super::*;

  fn def(json: &str) -> CampaignDef {
    serde_json::from_str(json).unwrap()
  }

  #[test]
  fn test_product_with_range() {
    let campaign = Campaign::from_def(
      def(
        r#"{
          "name": "rc",
          "netlist": "rc.net",
          "sweep": { "kind": "product", "axes": [
            { "name": "a", "values": [1, 2] },
            { "name": "b", "values": { "range": "linear", "start": 10, "stop": 20, "step": 10 } }
          ] },
          "timeout_ms": 250
        }"#,
      ),
      Some(Path::new("/campaigns")),
    )
    .unwrap();

    assert_eq!(campaign.netlist, PathBuf::from("/campaigns/rc.net"));
    let tasks = campaign.tasks();
    let coordinates: Vec<String> = tasks.iter().map(|t| t.coordinate.to_string()).collect();
    assert_eq!(coordinates, vec!["a=1 b=10", "a=1 b=20", "a=2 b=10", "a=2 b=20"]);
    assert_eq!(tasks[0].timeout, Some(Duration::from_millis(250)));
    assert_eq!(campaign.expected_runs(), 4);
  }

  #[test]
  fn test_single_task_with_steps() {
    let campaign = Campaign::from_def(
      def(
        r#"{
          "name": "op",
          "netlist": "/abs/op.net",
          "steps": { "kind": "list", "parameters": ["c"], "points": [["1u"], [2e-6]] },
          "flags": ["-a"]
        }"#,
      ),
      Some(Path::new("/ignored")),
    )
    .unwrap();

    assert_eq!(campaign.netlist, PathBuf::from("/abs/op.net"));
    let tasks = campaign.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].coordinate, StepCoordinate::new());
    assert_eq!(tasks[0].flags, vec!["-a"]);
    assert_eq!(tasks[0].expected_runs(), 2);
    assert_eq!(
      tasks[0].expected_coordinates()[0],
      StepCoordinate::new().with("c", "1u")
    );
  }

  #[test]
  fn test_shared_parameter_rejected() {
    let err = Campaign::from_def(
      def(
        r#"{
          "name": "bad",
          "netlist": "rc.net",
          "sweep": { "kind": "list", "parameters": ["r"], "points": [[1]] },
          "steps": { "kind": "list", "parameters": ["r"], "points": [[2]] }
        }"#,
      ),
      None,
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::InvalidCampaign { .. }));
  }

  #[test]
  fn test_empty_sweep_rejected() {
    let err = Campaign::from_def(
      def(
        r#"{
          "name": "empty",
          "netlist": "rc.net",
          "sweep": { "kind": "list", "parameters": ["r"], "points": [] }
        }"#,
      ),
      None,
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::InvalidCampaign { .. }));
  }

  #[test]
  fn test_invalid_range() {
    let err = Campaign::from_def(
      def(
        r#"{
          "name": "bad",
          "netlist": "rc.net",
          "sweep": { "kind": "product", "axes": [
            { "name": "r", "values": { "range": "geometric", "start": 1, "stop": 100, "factor": 1 } }
          ] }
        }"#,
      ),
      None,
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::Sweep(StepError::InvalidSweep { .. })));
  }
}
