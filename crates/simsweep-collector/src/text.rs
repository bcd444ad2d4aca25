/// Logs are UTF-8 or, from some simulators, UTF-16LE.
pub(crate) fn decode_log_text(bytes: &[u8]) -> String {
  let utf16 = bytes.starts_with(&[0xFF, 0xFE]) || (bytes.len() >= 2 && bytes[1] == 0);
  if !utf16 {
    return String::from_utf8_lossy(bytes).into_owned();
  }
  let body = bytes.strip_prefix(&[0xFF, 0xFE]).unwrap_or(bytes);
  let units: Vec<u16> = body
    .chunks_exact(2)
    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
    .collect();
  String::from_utf16_lossy(&units)
}
