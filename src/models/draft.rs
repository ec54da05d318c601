use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::{ExtractedDetails, TimeSlot};

pub const DEFAULT_DURATION_MINUTES: i64 = 60;
pub const DEFAULT_TITLE: &str = "Meeting";

/// A booking request accumulated across turns.
///
/// Once `start` and a duration are known, `end == start + duration` unless the
/// end was supplied explicitly, in which case the duration is derived from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppointmentDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "start_date")]
    pub start: Option<NaiveDateTime>,
    #[serde(rename = "end_date")]
    pub end: Option<NaiveDateTime>,
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default)]
    pub end_is_explicit: bool,
}

impl AppointmentDraft {
    /// Fold one utterance's hints into the draft.
    ///
    /// `extracted` comes from the extractor chain and overwrites what it carries.
    /// `fallback` holds rule-based hints and only fills fields still unset.
    /// Applying the same inputs twice leaves the draft unchanged.
    pub fn merge(&mut self, extracted: Option<&ExtractedDetails>, fallback: &ExtractedDetails) {
        let previous_start = self.start;
        let mut end_supplied = false;

        if let Some(found) = extracted {
            if let Some(start) = found.start {
                self.start = Some(start);
            }
            if let Some(end) = found.end {
                self.end = Some(end);
                self.end_is_explicit = true;
                end_supplied = true;
            }
            if let Some(minutes) = found.duration_minutes.filter(|m| *m > 0) {
                self.duration_minutes = Some(minutes);
            }
            if let Some(title) = non_blank(found.title.as_deref()) {
                self.title = Some(title);
            }
            if let Some(description) = non_blank(found.description.as_deref()) {
                self.description = Some(description);
            }
        }

        if self.start.is_none() {
            if let Some(start) = fallback.start {
                self.start = Some(start);
                if let Some(end) = fallback.end {
                    self.end = Some(end);
                    self.end_is_explicit = true;
                    end_supplied = true;
                }
            }
        }
        if self.duration_minutes.is_none() {
            self.duration_minutes = fallback.duration_minutes.filter(|m| *m > 0);
        }
        if self.title.is_none() {
            self.title = Some(
                non_blank(fallback.title.as_deref()).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            );
        }

        // A moved start without a new end invalidates an earlier explicit end.
        if self.start != previous_start && previous_start.is_some() && !end_supplied {
            self.end_is_explicit = false;
        }

        self.resolve();
    }

    fn resolve(&mut self) {
        let Some(start) = self.start else {
            return;
        };
        match self.end {
            Some(end) if self.end_is_explicit => {
                self.duration_minutes = Some((end - start).num_minutes());
            }
            _ => {
                let minutes = *self.duration_minutes.get_or_insert(DEFAULT_DURATION_MINUTES);
                self.end = offset(start, minutes);
                self.end_is_explicit = false;
            }
        }
    }

    pub fn has_start(&self) -> bool {
        self.start.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.start.is_some() && self.duration_minutes.is_some()
    }

    pub fn interval(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let start = self.start?;
        let end = match self.end {
            Some(end) => end,
            None => offset(start, self.duration_minutes?)?,
        };
        Some((start, end))
    }

    pub fn title_or_default(&self) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| DEFAULT_TITLE.to_string())
    }

    pub fn adopt_slot(&mut self, slot: &TimeSlot) {
        self.start = Some(slot.start());
        self.end = Some(slot.end());
        self.duration_minutes = Some(slot.duration_minutes());
        self.end_is_explicit = true;
    }

    /// Forget a rejected time so the next utterance can supply a new one.
    pub fn release_time(&mut self) {
        self.start = None;
        self.end = None;
        self.end_is_explicit = false;
    }

    /// Forget a rejected duration along with the end derived from or defining it.
    pub fn release_duration(&mut self) {
        self.duration_minutes = None;
        self.end = None;
        self.end_is_explicit = false;
    }
}

fn offset(start: NaiveDateTime, minutes: i64) -> Option<NaiveDateTime> {
    start.checked_add_signed(Duration::try_minutes(minutes)?)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}
