use std::collections::HashMap;
use std::time::Duration;

/// Reads the wait hint from `retry-after-ms` or numeric `retry-after` headers.
///
/// HTTP-date values are ignored; every vendor here sends seconds.
pub(crate) fn retry_after_from_headers(headers: &HashMap<String, String>) -> Option<Duration> {
    let header = |wanted: &str| {
        headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
            .map(|(_, value)| value.trim())
    };

    if let Some(millis) = header("retry-after-ms").and_then(|v| v.parse::<f64>().ok()) {
        if millis.is_finite() && millis >= 0.0 {
            return Some(Duration::from_millis(millis as u64));
        }
    }
    header("retry-after")
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
}
