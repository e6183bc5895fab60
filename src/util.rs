//! Small utility helpers used across modules.

use crate::error::BankError;

/// Fresh opaque record id.
pub fn new_id() -> String {
  uuid::Uuid::new_v4().to_string()
}

/// Trim a required string field, rejecting it when empty.
pub fn require_non_empty(value: &str, what: &str) -> Result<String, BankError> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    Err(BankError::Validation(format!("{} must not be empty", what)))
  } else {
    Ok(trimmed.to_string())
  }
}

/// Collapse an optional string so that blank means absent.
pub fn non_blank(value: Option<&str>) -> Option<String> {
  value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Log-safe truncation for large strings (question bodies can be long).
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}
