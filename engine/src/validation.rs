//! Input validation.
//!
//! Every check here runs before a mutation touches the state, so a failing
//! call leaves the store exactly as it was.

use crate::error::Result;
use crate::tenant::OperatingHours;
use crate::Error;
use chrono::{DateTime, Datelike, Duration, Utc};

/// Trimmed value of a required text field.
pub fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::MissingRequiredField(field.to_string()));
    }
    Ok(trimmed)
}

/// Optional text field, with blank values folded to `None`.
pub fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Basic email shape: one `@`, non-empty local part, dotted domain.
pub fn email(field: &str, value: &str) -> Result<String> {
    let value = required(field, value)?;
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(Error::invalid(field, format!("'{value}' is not an email address")));
    }
    Ok(value.to_lowercase())
}

/// Clinic slugs: lowercase ASCII letters, digits and dashes.
pub fn slug(value: &str) -> Result<String> {
    let value = required("slug", value)?.to_lowercase();
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(Error::invalid(
            "slug",
            "use only letters, digits and dashes",
        ));
    }
    Ok(value)
}

/// A finite amount strictly above zero.
pub fn positive_amount(field: &str, value: f64) -> Result<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::invalid(field, "must be a positive number"));
    }
    Ok(value)
}

/// An optional finite amount, zero allowed.
pub fn non_negative(field: &str, value: Option<f64>) -> Result<Option<f64>> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => {
            Err(Error::invalid(field, "must be zero or a positive number"))
        }
        other => Ok(other),
    }
}

/// Check an appointment window against the clinic's hours.
///
/// Times are compared in the clinic's local offset. The whole interval must
/// fall on a working day between opening and closing time.
pub fn schedule(hours: &OperatingHours, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if end <= start {
        return Err(Error::InvalidSchedule(
            "the appointment must end after it starts".into(),
        ));
    }
    if hours.closes_at <= hours.opens_at {
        return Err(Error::InvalidSchedule(
            "the clinic has no opening window configured".into(),
        ));
    }

    let offset = Duration::minutes(i64::from(hours.utc_offset_minutes));
    let local_start = (start + offset).naive_utc();
    let local_end = (end + offset).naive_utc();

    if local_start.date() != local_end.date() {
        return Err(Error::InvalidSchedule(
            "the appointment must start and end on the same day".into(),
        ));
    }
    let weekday = local_start.weekday();
    if !hours.working_days.is_empty() && !hours.working_days.contains(&weekday) {
        return Err(Error::InvalidSchedule(format!(
            "the clinic does not open on {weekday}"
        )));
    }
    if local_start.time() < hours.opens_at || local_end.time() > hours.closes_at {
        return Err(Error::InvalidSchedule(format!(
            "appointments must be between {} and {}",
            hours.opens_at.format("%H:%M"),
            hours.closes_at.format("%H:%M")
        )));
    }
    Ok(())
}
