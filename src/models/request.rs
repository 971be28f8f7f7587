use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DURATION_MINUTES: i64 = 30;
const MAX_NAME_LEN: usize = 120;
const MAX_EMAIL_LEN: usize = 254;
const MAX_PHONE_LEN: usize = 40;
const MAX_NOTES_LEN: usize = 4000;
const MAX_META_LEN: usize = 500;
/// Accepted start years; stored timestamps need four-digit years.
const START_YEARS: std::ops::RangeInclusive<i32> = 2000..=9998;

/// Body of `POST /api/book`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub start_iso: String,
    pub duration_min: Option<i64>,
    pub reschedule_token: Option<String>,
    pub producer_id: Option<String>,
    #[serde(flatten)]
    pub context: BookingContext,
}

/// Funnel metadata that travels with a booking into notifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingContext {
    pub plan_pid: Option<String>,
    pub share_url: Option<String>,
    pub service: Option<String>,
    pub persona: Option<String>,
    pub role: Option<String>,
    pub focus: Option<String>,
    pub cadence: Option<String>,
    pub timeline: Option<String>,
    pub site: Option<String>,
}

impl BookingContext {
    /// Non-empty `(label, value)` pairs in display order.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        [
            ("Service", &self.service),
            ("Persona", &self.persona),
            ("Role", &self.role),
            ("Focus", &self.focus),
            ("Cadence", &self.cadence),
            ("Timeline", &self.timeline),
            ("Site", &self.site),
            ("Plan", &self.plan_pid),
            ("Share URL", &self.share_url),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.as_deref().map(|v| (label, v)))
        .collect()
    }

    fn normalize(self, errors: &mut Vec<String>) -> Self {
        let mut field = |name: &str, value: Option<String>| {
            let value = clean(value);
            if let Some(v) = &value {
                if v.chars().count() > MAX_META_LEN {
                    errors.push(format!("{name} must be at most {MAX_META_LEN} characters"));
                }
            }
            value
        };

        Self {
            plan_pid: field("planPid", self.plan_pid),
            share_url: field("shareUrl", self.share_url),
            service: field("service", self.service),
            persona: field("persona", self.persona),
            role: field("role", self.role),
            focus: field("focus", self.focus),
            cadence: field("cadence", self.cadence),
            timeline: field("timeline", self.timeline),
            site: field("site", self.site),
        }
    }
}

/// A booking request that passed validation, with its interval resolved.
#[derive(Debug, Clone)]
pub struct ValidatedBooking {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
    pub reschedule_token: Option<String>,
    pub producer_id: Option<String>,
    pub context: BookingContext,
}

impl BookingRequest {
    pub fn validate(self) -> Result<ValidatedBooking, Vec<String>> {
        let mut errors = Vec::new();

        let name = self.name.trim().to_string();
        if name.is_empty() {
            errors.push("name is required".to_string());
        } else if name.chars().count() > MAX_NAME_LEN {
            errors.push(format!("name must be at most {MAX_NAME_LEN} characters"));
        }

        let email = self.email.trim().to_string();
        if !is_plausible_email(&email) {
            errors.push("email must be a valid email address".to_string());
        }

        let phone = clean(self.phone);
        if phone.as_ref().is_some_and(|p| p.chars().count() > MAX_PHONE_LEN) {
            errors.push(format!("phone must be at most {MAX_PHONE_LEN} characters"));
        }

        let notes = clean(self.notes);
        if notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
            errors.push(format!("notes must be at most {MAX_NOTES_LEN} characters"));
        }

        let start = match DateTime::parse_from_rfc3339(self.start_iso.trim()) {
            Ok(dt) if START_YEARS.contains(&dt.with_timezone(&Utc).year()) => {
                Some(dt.with_timezone(&Utc))
            }
            Ok(_) => {
                errors.push(format!(
                    "startIso must fall between the years {} and {}",
                    START_YEARS.start(),
                    START_YEARS.end()
                ));
                None
            }
            Err(_) => {
                errors.push("startIso must be an ISO 8601 timestamp with a UTC offset".to_string());
                None
            }
        };

        let duration_minutes = self.duration_min.unwrap_or(DEFAULT_DURATION_MINUTES);
        if !(15..=120).contains(&duration_minutes) {
            errors.push(format!(
                "durationMin must be between 15 and 120 (got {duration_minutes})"
            ));
        }

        let reschedule_token = clean(self.reschedule_token);
        let producer_id = clean(self.producer_id);
        let context = self.context.normalize(&mut errors);

        match start {
            Some(start) if errors.is_empty() => Ok(ValidatedBooking {
                name,
                email,
                phone,
                notes,
                start,
                end: start + Duration::minutes(duration_minutes),
                duration_minutes,
                reschedule_token,
                producer_id,
                context,
            }),
            _ => Err(errors),
        }
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_plausible_email(email: &str) -> bool {
    if email.is_empty() || email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BookingRequest {
        BookingRequest {
            name: "Dana Client".to_string(),
            email: "dana@example.com".to_string(),
            start_iso: "2030-03-04T15:00:00Z".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_request_defaults_duration() {
        let booking = request().validate().unwrap();
        assert_eq!(booking.duration_minutes, 30);
        assert_eq!(booking.end - booking.start, Duration::minutes(30));
        assert_eq!(booking.start.to_rfc3339(), "2030-03-04T15:00:00+00:00");
    }

    #[test]
    fn test_offset_start_is_normalized_to_utc() {
        let mut req = request();
        req.start_iso = "2030-03-04T10:00:00-05:00".to_string();
        let booking = req.validate().unwrap();
        assert_eq!(booking.start.to_rfc3339(), "2030-03-04T15:00:00+00:00");
    }

    #[test]
    fn test_duration_bounds() {
        let mut req = request();
        req.duration_min = Some(14);
        assert!(req.validate().is_err());

        let mut req = request();
        req.duration_min = Some(121);
        assert!(req.validate().is_err());

        let mut req = request();
        req.duration_min = Some(120);
        assert_eq!(req.validate().unwrap().duration_minutes, 120);
    }

    #[test]
    fn test_start_year_out_of_range() {
        for start in ["9999-12-31T23:45:00Z", "1999-12-31T23:00:00Z", "0001-01-01T00:00:00Z"] {
            let mut req = request();
            req.start_iso = start.to_string();
            let errors = req.validate().unwrap_err();
            assert_eq!(errors.len(), 1, "{start}: {errors:?}");
            assert!(errors[0].starts_with("startIso"));
        }

        let mut req = request();
        req.start_iso = "9998-12-31T23:00:00Z".to_string();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let req = BookingRequest {
            name: "   ".to_string(),
            email: "not-an-email".to_string(),
            start_iso: "tomorrow at noon".to_string(),
            ..Default::default()
        };
        let errors = req.validate().unwrap_err();
        assert_eq!(errors.len(), 3, "{errors:?}");
    }

    #[test]
    fn test_email_plausibility() {
        assert!(is_plausible_email("a@b.co"));
        assert!(is_plausible_email("first.last+tag@studio.example.com"));
        assert!(!is_plausible_email("a@b"));
        assert!(!is_plausible_email("@b.co"));
        assert!(!is_plausible_email("a@@b.co"));
        assert!(!is_plausible_email("a b@c.co"));
    }

    #[test]
    fn test_blank_optionals_become_none() {
        let mut req = request();
        req.phone = Some("  ".to_string());
        req.producer_id = Some(String::new());
        req.context.service = Some(" video ".to_string());
        let booking = req.validate().unwrap();
        assert!(booking.phone.is_none());
        assert!(booking.producer_id.is_none());
        assert_eq!(booking.context.service.as_deref(), Some("video"));
    }

    #[test]
    fn test_deserializes_camel_case_with_metadata() {
        let json = r#"{
            "name": "Dana",
            "email": "dana@example.com",
            "startIso": "2030-03-04T15:00:00.000Z",
            "durationMin": 45,
            "rescheduleToken": "tok",
            "planPid": "plan-7",
            "cadence": "weekly"
        }"#;
        let req: BookingRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.duration_min, Some(45));
        assert_eq!(req.reschedule_token.as_deref(), Some("tok"));
        assert_eq!(req.context.plan_pid.as_deref(), Some("plan-7"));
        assert_eq!(req.context.cadence.as_deref(), Some("weekly"));
    }

    #[test]
    fn test_context_entries_skip_missing() {
        let context = BookingContext {
            service: Some("Podcast".to_string()),
            timeline: Some("Q3".to_string()),
            ..Default::default()
        };
        assert_eq!(context.entries(), vec![("Service", "Podcast"), ("Timeline", "Q3")]);
    }
}
