use anyhow::Result;
use serde_json::json;

use crate::domain::result::MigrationResult;

/// Serialize the full migration result as pretty JSON.
pub fn to_json(result: &MigrationResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

/// The error envelope used by the control surface: numeric-coded lines
/// plus whatever reply fields are available.
pub fn error_envelope(errors: &[String]) -> String {
    json!({ "errors": errors }).to_string()
}
