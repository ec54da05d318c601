use chrono::{Duration, NaiveDateTime};

use crate::models::{AppointmentDraft, BusinessHours};

/// Bounds every booking has to satisfy before it reaches a calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingLimits {
    pub min_duration_minutes: i64,
    pub max_duration_minutes: i64,
    pub max_days_ahead: i64,
}

impl Default for BookingLimits {
    fn default() -> Self {
        Self {
            min_duration_minutes: 15,
            max_duration_minutes: 240,
            max_days_ahead: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("I still need a start time for the appointment.")]
    MissingStart,

    #[error("Appointments must be at least {min} minutes long.")]
    DurationTooShort { min: i64 },

    #[error("Appointments can be at most {max} minutes long.")]
    DurationTooLong { max: i64 },

    #[error("The start time must be before the end time.")]
    StartNotBeforeEnd,

    #[error("That start time is in the past.")]
    StartInPast,

    #[error("I can only book up to {days} days ahead.")]
    BeyondHorizon { days: i64 },

    #[error("That time is outside business hours ({hours}).")]
    OutsideBusinessHours { hours: String },
}

impl ValidationError {
    /// The request field the error is about.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingStart
            | ValidationError::StartInPast
            | ValidationError::BeyondHorizon { .. }
            | ValidationError::OutsideBusinessHours { .. } => "start",
            ValidationError::DurationTooShort { .. } | ValidationError::DurationTooLong { .. } => {
                "duration"
            }
            ValidationError::StartNotBeforeEnd => "end",
        }
    }
}

pub fn validate_duration(minutes: i64, limits: &BookingLimits) -> Result<(), ValidationError> {
    if minutes < limits.min_duration_minutes {
        return Err(ValidationError::DurationTooShort {
            min: limits.min_duration_minutes,
        });
    }
    if minutes > limits.max_duration_minutes {
        return Err(ValidationError::DurationTooLong {
            max: limits.max_duration_minutes,
        });
    }
    Ok(())
}

/// Ordering, past/horizon and duration checks shared by every write path.
pub fn validate_interval(
    start: NaiveDateTime,
    end: NaiveDateTime,
    now: NaiveDateTime,
    limits: &BookingLimits,
) -> Result<(), ValidationError> {
    if start >= end {
        return Err(ValidationError::StartNotBeforeEnd);
    }
    if start < now {
        return Err(ValidationError::StartInPast);
    }
    if start > now + Duration::days(limits.max_days_ahead) {
        return Err(ValidationError::BeyondHorizon {
            days: limits.max_days_ahead,
        });
    }
    validate_duration((end - start).num_minutes(), limits)
}

/// Full check for a conversational booking, business hours last so the caller
/// can tell "bad request" apart from "good request at a closed time".
pub fn validate_draft(
    draft: &AppointmentDraft,
    hours: &BusinessHours,
    now: NaiveDateTime,
    limits: &BookingLimits,
) -> Result<(), ValidationError> {
    draft.start.ok_or(ValidationError::MissingStart)?;
    // A start without a computable end means the duration overflowed the calendar.
    let (start, end) = draft.interval().ok_or(ValidationError::DurationTooLong {
        max: limits.max_duration_minutes,
    })?;
    validate_interval(start, end, now, limits)?;

    if !hours.contains(&start, &end) {
        return Err(ValidationError::OutsideBusinessHours {
            hours: hours.to_human_readable(),
        });
    }
    Ok(())
}

/// A search window for availability queries: ordered, not in the past, inside the horizon.
pub fn validate_window(
    start: NaiveDateTime,
    end: NaiveDateTime,
    now: NaiveDateTime,
    limits: &BookingLimits,
) -> Result<(), ValidationError> {
    if start >= end {
        return Err(ValidationError::StartNotBeforeEnd);
    }
    // Same-day queries that started a few minutes ago are fine.
    if end <= now {
        return Err(ValidationError::StartInPast);
    }
    // The whole window, not just its start, must sit inside the horizon.
    if end > now + Duration::days(limits.max_days_ahead) {
        return Err(ValidationError::BeyondHorizon {
            days: limits.max_days_ahead,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn now() -> NaiveDateTime {
        dt("2026-10-19 08:00")
    }

    fn draft(start: &str, minutes: i64) -> AppointmentDraft {
        let start = dt(start);
        AppointmentDraft {
            start: Some(start),
            end: Some(start + Duration::minutes(minutes)),
            duration_minutes: Some(minutes),
            ..Default::default()
        }
    }

    #[test]
    fn test_duration_bounds_are_inclusive() {
        let limits = BookingLimits::default();
        assert_eq!(
            validate_duration(5, &limits),
            Err(ValidationError::DurationTooShort { min: 15 })
        );
        assert_eq!(
            validate_duration(500, &limits),
            Err(ValidationError::DurationTooLong { max: 240 })
        );
        assert!(validate_duration(15, &limits).is_ok());
        assert!(validate_duration(240, &limits).is_ok());
    }

    #[test]
    fn test_interval_ordering_and_horizon() {
        let limits = BookingLimits::default();
        assert_eq!(
            validate_interval(dt("2026-10-20 10:00"), dt("2026-10-20 10:00"), now(), &limits),
            Err(ValidationError::StartNotBeforeEnd)
        );
        assert_eq!(
            validate_interval(dt("2026-10-18 10:00"), dt("2026-10-18 11:00"), now(), &limits),
            Err(ValidationError::StartInPast)
        );
        assert_eq!(
            validate_interval(dt("2027-02-01 10:00"), dt("2027-02-01 11:00"), now(), &limits),
            Err(ValidationError::BeyondHorizon { days: 90 })
        );
        assert!(validate_interval(dt("2026-10-20 10:00"), dt("2026-10-20 11:00"), now(), &limits).is_ok());
    }

    #[test]
    fn test_errors_name_their_field() {
        assert_eq!(ValidationError::DurationTooShort { min: 15 }.field(), "duration");
        assert_eq!(ValidationError::StartInPast.field(), "start");
        assert_eq!(ValidationError::StartNotBeforeEnd.field(), "end");
    }

    #[test]
    fn test_draft_outside_business_hours() {
        let hours = BusinessHours::default();
        let limits = BookingLimits::default();

        let late = draft("2026-10-20 19:00", 60);
        assert!(matches!(
            validate_draft(&late, &hours, now(), &limits),
            Err(ValidationError::OutsideBusinessHours { .. })
        ));

        let fine = draft("2026-10-20 15:00", 60);
        assert!(validate_draft(&fine, &hours, now(), &limits).is_ok());
    }

    #[test]
    fn test_draft_duration_checked_before_hours() {
        let hours = BusinessHours::default();
        let limits = BookingLimits::default();
        let short_and_late = draft("2026-10-20 20:00", 5);
        assert_eq!(
            validate_draft(&short_and_late, &hours, now(), &limits),
            Err(ValidationError::DurationTooShort { min: 15 })
        );
    }

    #[test]
    fn test_draft_without_start() {
        let limits = BookingLimits::default();
        assert_eq!(
            validate_draft(&AppointmentDraft::default(), &BusinessHours::default(), now(), &limits),
            Err(ValidationError::MissingStart)
        );
    }

    #[test]
    fn test_window_checks() {
        let limits = BookingLimits::default();
        assert!(validate_window(dt("2026-10-19 07:00"), dt("2026-10-20 18:00"), now(), &limits).is_ok());
        assert_eq!(
            validate_window(dt("2026-10-17 09:00"), dt("2026-10-18 18:00"), now(), &limits),
            Err(ValidationError::StartInPast)
        );
        assert_eq!(
            validate_window(dt("2026-10-21 09:00"), dt("2026-10-20 18:00"), now(), &limits),
            Err(ValidationError::StartNotBeforeEnd)
        );
    }

    #[test]
    fn test_window_end_is_bounded_by_horizon() {
        let limits = BookingLimits::default();
        assert_eq!(
            validate_window(dt("2026-10-20 09:00"), dt("2036-10-20 09:00"), now(), &limits),
            Err(ValidationError::BeyondHorizon { days: 90 })
        );
        // now + 90 days exactly is still inside.
        assert!(validate_window(dt("2026-10-20 09:00"), dt("2027-01-17 08:00"), now(), &limits).is_ok());
        assert!(validate_window(dt("2026-10-20 09:00"), dt("2027-01-17 08:01"), now(), &limits).is_err());
    }
}
