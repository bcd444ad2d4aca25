//! Textual header: types, parsing and rendering.

use std::fmt;
use std::io::{BufRead, Read};

use serde::{Deserialize, Serialize};

use crate::error::RawError;
use crate::samples::SampleKind;
use crate::step::StepCoordinate;

const MAX_HEADER_BYTES: usize = 1 << 20;
const SENTINEL: &str = "Binary:";
const ASCII_SENTINEL: &str = "Values:";

/// Keys with a dedicated field on [`RawHeader`]; never stored as properties.
const RESERVED_KEYS: &[&str] = &[
  "Plotname",
  "Command",
  "Flags",
  "No. Variables",
  "No. Points",
  "Byte Order",
  "Precision",
  "Step",
  "Variables",
  "Binary",
  "Values",
];

const FLAG_KEYWORDS: &[&str] = &["real", "complex", "fastaccess", "stepped", "compressed"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
  Little,
  Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
  Single,
  Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Numeric {
  Real,
  Complex,
}

/// Physical arrangement of the binary payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
  /// All variables of point `i` are adjacent.
  Interleaved,
  /// All points of one variable are contiguous (`fastaccess`).
  Block,
}

/// Text encoding of the header block. The payload is always binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderEncoding {
  Utf8,
  Utf16Le,
}

impl fmt::Display for ByteOrder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ByteOrder::Little => f.write_str("little"),
      ByteOrder::Big => f.write_str("big"),
    }
  }
}

impl fmt::Display for Precision {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Precision::Single => f.write_str("single"),
      Precision::Double => f.write_str("double"),
    }
  }
}

/// Run-level metadata declared in the header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHeader {
  pub plotname: String,
  /// Simulator identifier (`Command:` line).
  pub simulator: String,
  pub numeric: Numeric,
  pub precision: Precision,
  pub byte_order: ByteOrder,
  pub layout: Layout,
  pub stepped: bool,
  pub compressed: bool,
  /// Flags this codec does not interpret (`forward`, `log`, ...), kept verbatim.
  pub extra_flags: Vec<String>,
  /// Optional `Key: value` lines (`Title`, `Date`, `Offset`, ...) in file order.
  pub properties: Vec<(String, String)>,
  pub encoding: HeaderEncoding,
}

impl RawHeader {
  /// A real, single precision, little endian, interleaved UTF-8 header.
  pub fn new(plotname: impl Into<String>, simulator: impl Into<String>) -> Self {
    Self {
      plotname: plotname.into(),
      simulator: simulator.into(),
      numeric: Numeric::Real,
      precision: Precision::Single,
      byte_order: ByteOrder::Little,
      layout: Layout::Interleaved,
      stepped: false,
      compressed: false,
      extra_flags: Vec::new(),
      properties: Vec::new(),
      encoding: HeaderEncoding::Utf8,
    }
  }

  /// Sample representation of the variable at `index`.
  ///
  /// Real files keep the independent axis in double precision whatever the
  /// declared precision; complex files use the declared precision throughout.
  pub fn sample_kind(&self, index: usize) -> SampleKind {
    match (self.numeric, self.precision) {
      (Numeric::Complex, Precision::Single) => SampleKind::Complex32,
      (Numeric::Complex, Precision::Double) => SampleKind::Complex64,
      (Numeric::Real, _) if index == 0 => SampleKind::Real64,
      (Numeric::Real, Precision::Single) => SampleKind::Real32,
      (Numeric::Real, Precision::Double) => SampleKind::Real64,
    }
  }

  pub fn property(&self, key: &str) -> Option<&str> {
    self
      .properties
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }

  fn flags_line(&self) -> String {
    let mut flags = vec![match self.numeric {
      Numeric::Real => "real".to_string(),
      Numeric::Complex => "complex".to_string(),
    }];
    if self.layout == Layout::Block {
      flags.push("fastaccess".to_string());
    }
    if self.stepped {
      flags.push("stepped".to_string());
    }
    if self.compressed {
      flags.push("compressed".to_string());
    }
    flags.extend(self.extra_flags.iter().cloned());
    flags.join(" ")
  }

  /// Check that every text field survives a write/read cycle unchanged.
  pub(crate) fn validate(&self) -> Result<(), RawError> {
    check_value("Plotname", &self.plotname)?;
    check_value("Command", &self.simulator)?;
    for flag in &self.extra_flags {
      let lower = flag.to_ascii_lowercase();
      if flag.is_empty()
        || flag.contains(char::is_whitespace)
        || FLAG_KEYWORDS.contains(&lower.as_str())
      {
        return Err(RawError::format(format!("invalid extra flag '{flag}'")));
      }
    }
    for (key, value) in &self.properties {
      let valid_key = !key.is_empty()
        && key.trim() == key
        && key.chars().all(|c| c.is_ascii() && !c.is_ascii_control() && c != ':')
        && !RESERVED_KEYS.contains(&key.as_str());
      if !valid_key {
        return Err(RawError::format(format!("invalid header property key '{key}'")));
      }
      check_value(key, value)?;
    }
    Ok(())
  }
}

fn check_value(key: &str, value: &str) -> Result<(), RawError> {
  if value.trim() != value || value.contains(['\n', '\r']) {
    return Err(RawError::format(format!(
      "header value for '{key}' must be a single trimmed line"
    )));
  }
  Ok(())
}

/// A declared variable (trace name and unit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
  pub name: String,
  pub unit: String,
}

/// Everything the header of one segment declares.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentHeader {
  pub header: RawHeader,
  pub variables: Vec<Variable>,
  pub num_points: usize,
  pub step: Option<StepCoordinate>,
}

impl SegmentHeader {
  /// Exact number of payload bytes that follow the header.
  pub fn payload_len(&self) -> Result<usize, RawError> {
    (0..self.variables.len())
      .map(|i| self.header.sample_kind(i).width())
      .try_fold(0usize, |acc, width| {
        width
          .checked_mul(self.num_points)
          .and_then(|bytes| acc.checked_add(bytes))
      })
      .ok_or_else(|| RawError::format("declared payload size overflows"))
  }
}

/// Read and parse one header block, leaving `reader` at the first payload byte.
///
/// Returns `Ok(None)` when `reader` is already at end of input.
pub fn read_header<R: BufRead>(reader: &mut R) -> Result<Option<SegmentHeader>, RawError> {
  match read_header_lines(reader)? {
    Some((encoding, lines)) => parse_lines(encoding, lines).map(Some),
    None => Ok(None),
  }
}

fn read_header_lines<R: BufRead>(
  reader: &mut R,
) -> Result<Option<(HeaderEncoding, Vec<String>)>, RawError> {
  if reader.fill_buf()?.is_empty() {
    return Ok(None);
  }

  let mut lead = [0u8; 2];
  reader.read_exact(&mut lead).map_err(eof_as_format)?;
  let encoding = if lead[0] != 0 && lead[1] == 0 {
    HeaderEncoding::Utf16Le
  } else {
    HeaderEncoding::Utf8
  };

  let mut source = (&lead[..]).chain(reader);
  let mut lines = Vec::new();
  let mut consumed = 0usize;

  loop {
    let line = match encoding {
      HeaderEncoding::Utf8 => {
        let mut buf = Vec::new();
        let n = source.read_until(b'\n', &mut buf)?;
        if n == 0 {
          return Err(missing_sentinel());
        }
        consumed += n;
        String::from_utf8(buf).map_err(|_| RawError::format("header is not valid UTF-8"))?
      }
      HeaderEncoding::Utf16Le => {
        let mut units = Vec::new();
        loop {
          let mut unit = [0u8; 2];
          source.read_exact(&mut unit).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => missing_sentinel(),
            _ => RawError::Io(e),
          })?;
          consumed += 2;
          let unit = u16::from_le_bytes(unit);
          if unit == u16::from(b'\n') {
            break;
          }
          units.push(unit);
          if consumed > MAX_HEADER_BYTES {
            break;
          }
        }
        String::from_utf16(&units).map_err(|_| RawError::format("header is not valid UTF-16"))?
      }
    };

    if consumed > MAX_HEADER_BYTES {
      return Err(RawError::format("header exceeds 1 MiB"));
    }

    let line = line.trim_end_matches(['\n', '\r']);
    if line == SENTINEL {
      return Ok(Some((encoding, lines)));
    }
    if line == ASCII_SENTINEL {
      return Err(RawError::unsupported("ASCII 'Values:' payloads are not supported"));
    }
    lines.push(line.to_string());
  }
}

fn missing_sentinel() -> RawError {
  RawError::format("header ended before the 'Binary:' sentinel")
}

pub(crate) fn eof_as_format(e: std::io::Error) -> RawError {
  match e.kind() {
    std::io::ErrorKind::UnexpectedEof => RawError::format("unexpected end of input"),
    _ => RawError::Io(e),
  }
}

fn parse_lines(encoding: HeaderEncoding, lines: Vec<String>) -> Result<SegmentHeader, RawError> {
  let mut plotname = None;
  let mut simulator = None;
  let mut flags = None;
  let mut num_variables = None;
  let mut num_points = None;
  let mut byte_order = None;
  let mut precision = None;
  let mut step = None;
  let mut properties = Vec::new();
  let mut variables: Option<Vec<Variable>> = None;

  for line in lines {
    if let Some(vars) = variables.as_mut() {
      vars.push(parse_variable(&line, vars.len())?);
      continue;
    }
    if line.trim().is_empty() {
      continue;
    }

    let (key, value) = line
      .split_once(':')
      .ok_or_else(|| RawError::format(format!("malformed header line '{line}'")))?;
    let key = key.trim();
    let value = value.trim();

    match key {
      "Plotname" => plotname = Some(value.to_string()),
      "Command" => simulator = Some(value.to_string()),
      "Flags" => flags = Some(value.to_string()),
      "No. Variables" => num_variables = Some(parse_count(key, value)?),
      "No. Points" => num_points = Some(parse_count(key, value)?),
      "Byte Order" => byte_order = Some(parse_byte_order(value)?),
      "Precision" => precision = Some(parse_precision(value)?),
      "Step" => step = Some(value.parse::<StepCoordinate>()?),
      "Variables" => {
        if !value.is_empty() {
          return Err(RawError::format("unexpected text after 'Variables:'"));
        }
        variables = Some(Vec::new());
      }
      other => properties.push((other.to_string(), value.to_string())),
    }
  }

  let flags = flags.ok_or_else(|| missing_key("Flags"))?;
  let (numeric, layout, stepped, compressed, extra_flags) = parse_flags(&flags)?;
  let num_variables = num_variables.ok_or_else(|| missing_key("No. Variables"))?;
  let variables = variables.ok_or_else(|| missing_key("Variables"))?;

  if num_variables == 0 {
    return Err(RawError::format("a run needs at least one variable"));
  }
  if variables.len() != num_variables {
    return Err(RawError::format(format!(
      "header declares {num_variables} variables but lists {}",
      variables.len()
    )));
  }

  let header = RawHeader {
    plotname: plotname.ok_or_else(|| missing_key("Plotname"))?,
    simulator: simulator.ok_or_else(|| missing_key("Command"))?,
    numeric,
    precision: precision.ok_or_else(|| missing_key("Precision"))?,
    byte_order: byte_order.ok_or_else(|| missing_key("Byte Order"))?,
    layout,
    stepped,
    compressed,
    extra_flags,
    properties,
    encoding,
  };

  Ok(SegmentHeader {
    header,
    variables,
    num_points: num_points.ok_or_else(|| missing_key("No. Points"))?,
    step,
  })
}

fn missing_key(key: &str) -> RawError {
  RawError::format(format!("missing mandatory header key '{key}'"))
}

fn parse_count(key: &str, value: &str) -> Result<usize, RawError> {
  value
    .parse()
    .map_err(|_| RawError::format(format!("'{key}' is not a count: '{value}'")))
}

fn parse_byte_order(value: &str) -> Result<ByteOrder, RawError> {
  match value.to_ascii_lowercase().as_str() {
    "little" => Ok(ByteOrder::Little),
    "big" => Ok(ByteOrder::Big),
    _ => Err(RawError::unsupported(format!("byte order '{value}'"))),
  }
}

fn parse_precision(value: &str) -> Result<Precision, RawError> {
  match value.to_ascii_lowercase().as_str() {
    "single" => Ok(Precision::Single),
    "double" => Ok(Precision::Double),
    _ => Err(RawError::unsupported(format!("precision '{value}'"))),
  }
}

type Flags = (Numeric, Layout, bool, bool, Vec<String>);

fn parse_flags(value: &str) -> Result<Flags, RawError> {
  let mut numeric = None;
  let mut layout = Layout::Interleaved;
  let mut stepped = false;
  let mut compressed = false;
  let mut extra = Vec::new();

  for token in value.split_whitespace() {
    let kind = match token.to_ascii_lowercase().as_str() {
      "real" => Some(Numeric::Real),
      "complex" => Some(Numeric::Complex),
      "fastaccess" => {
        layout = Layout::Block;
        None
      }
      "stepped" => {
        stepped = true;
        None
      }
      "compressed" => {
        compressed = true;
        None
      }
      _ => {
        extra.push(token.to_string());
        None
      }
    };
    if let Some(kind) = kind {
      if numeric.is_some_and(|n| n != kind) {
        return Err(RawError::unsupported("flags declare both real and complex"));
      }
      numeric = Some(kind);
    }
  }

  let numeric =
    numeric.ok_or_else(|| RawError::unsupported("flags declare neither real nor complex"))?;
  Ok((numeric, layout, stepped, compressed, extra))
}

fn parse_variable(line: &str, position: usize) -> Result<Variable, RawError> {
  let mut fields: Vec<&str> = line
    .split('\t')
    .map(str::trim)
    .filter(|f| !f.is_empty())
    .collect();
  if fields.len() < 3 {
    fields = line.split_whitespace().collect();
  }
  if fields.len() < 3 {
    return Err(RawError::format(format!("malformed variable line '{line}'")));
  }

  let index: usize = fields[0]
    .parse()
    .map_err(|_| RawError::format(format!("malformed variable index in '{line}'")))?;
  if index != position {
    return Err(RawError::format(format!(
      "variable index {index} found at position {position}"
    )));
  }

  Ok(Variable {
    name: fields[1].to_string(),
    unit: fields[2].to_string(),
  })
}

/// Render the header block, sentinel included, in the header's encoding.
pub(crate) fn render(
  header: &RawHeader,
  variables: &[(&str, &str)],
  num_points: usize,
  step: Option<&StepCoordinate>,
) -> Vec<u8> {
  let mut text = String::new();
  for (key, value) in &header.properties {
    text.push_str(&format!("{key}: {value}\n"));
  }
  text.push_str(&format!("Plotname: {}\n", header.plotname));
  text.push_str(&format!("Flags: {}\n", header.flags_line()));
  text.push_str(&format!("No. Variables: {}\n", variables.len()));
  text.push_str(&format!("No. Points: {num_points}\n"));
  text.push_str(&format!("Byte Order: {}\n", header.byte_order));
  text.push_str(&format!("Precision: {}\n", header.precision));
  text.push_str(&format!("Command: {}\n", header.simulator));
  if let Some(step) = step {
    text.push_str(&format!("Step: {step}\n"));
  }
  text.push_str("Variables:\n");
  for (i, (name, unit)) in variables.iter().enumerate() {
    text.push_str(&format!("\t{i}\t{name}\t{unit}\n"));
  }
  text.push_str(SENTINEL);
  text.push('\n');

  match header.encoding {
    HeaderEncoding::Utf8 => text.into_bytes(),
    HeaderEncoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
  }
}
