//! Console formatting for key values

use crate::secret::SecretValue;

/// `name: value`, or the bare value when `value_only` is set
pub fn format_entry(name: &str, value: &SecretValue, value_only: bool) -> String {
    let value = String::from_utf8_lossy(value.expose_secret());
    if value_only {
        value.into_owned()
    } else {
        format!("{name}: {value}")
    }
}
