//! Quantity grammar checks for spec fields
//!
//! Deliberately narrower than the full Kubernetes quantity syntax: only the
//! forms the PostgresDatabase schema admits are accepted.

/// Binary capacity suffixes accepted for storage and memory
const CAPACITY_SUFFIXES: &[&str] = &["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Capacity quantity: digits followed by a binary suffix (e.g., "100Gi")
pub fn is_capacity_quantity(qty: &str) -> bool {
    CAPACITY_SUFFIXES
        .iter()
        .find_map(|suffix| qty.strip_suffix(suffix))
        .map(is_digits)
        .unwrap_or(false)
}

/// CPU quantity: whole cores or millicores (e.g., "2", "500m")
pub fn is_cpu_quantity(qty: &str) -> bool {
    is_digits(qty.strip_suffix('m').unwrap_or(qty))
}

/// Check a capacity field, producing the rejection reason
pub(crate) fn check_capacity(qty: &str) -> Result<(), String> {
    if is_capacity_quantity(qty) {
        Ok(())
    } else {
        Err(format!(
            "invalid quantity '{}' (expected an integer with a Ki/Mi/Gi/Ti/Pi/Ei suffix, e.g. '100Gi')",
            qty
        ))
    }
}

/// Check a CPU field, producing the rejection reason
pub(crate) fn check_cpu(qty: &str) -> Result<(), String> {
    if is_cpu_quantity(qty) {
        Ok(())
    } else {
        Err(format!(
            "invalid quantity '{}' (expected an integer, optionally with an 'm' suffix, e.g. '500m')",
            qty
        ))
    }
}
