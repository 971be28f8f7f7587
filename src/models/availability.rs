use serde::{Deserialize, Serialize};

pub const DEFAULT_DAYS: i64 = 14;
pub const DEFAULT_STEP_MINUTES: i64 = 30;
pub const DEFAULT_TZ_OFFSET_MINUTES: i64 = -300;

/// Raw query string for `GET /api/availability`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvailabilityParams {
    pub days: Option<i64>,
    pub step: Option<i64>,
    #[serde(rename = "tzOffset")]
    pub tz_offset: Option<i64>,
}

/// Validated availability request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityQuery {
    pub days: u32,
    pub step_minutes: u32,
    pub tz_offset_minutes: i32,
}

impl AvailabilityQuery {
    pub fn new(days: u32, step_minutes: u32, tz_offset_minutes: i32) -> Self {
        Self {
            days,
            step_minutes,
            tz_offset_minutes,
        }
    }
}

impl Default for AvailabilityQuery {
    fn default() -> Self {
        Self::new(
            DEFAULT_DAYS as u32,
            DEFAULT_STEP_MINUTES as u32,
            DEFAULT_TZ_OFFSET_MINUTES as i32,
        )
    }
}

impl TryFrom<AvailabilityParams> for AvailabilityQuery {
    type Error = Vec<String>;

    fn try_from(params: AvailabilityParams) -> Result<Self, Self::Error> {
        let days = params.days.unwrap_or(DEFAULT_DAYS);
        let step = params.step.unwrap_or(DEFAULT_STEP_MINUTES);
        let tz_offset = params.tz_offset.unwrap_or(DEFAULT_TZ_OFFSET_MINUTES);

        let mut errors = Vec::new();
        if !(1..=30).contains(&days) {
            errors.push(format!("days must be between 1 and 30 (got {days})"));
        }
        if !(15..=120).contains(&step) {
            errors.push(format!("step must be between 15 and 120 minutes (got {step})"));
        }
        if !(-720..=840).contains(&tz_offset) {
            errors.push(format!(
                "tzOffset must be between -720 and 840 minutes (got {tz_offset})"
            ));
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self::new(days as u32, step as u32, tz_offset as i32))
    }
}

/// One local calendar day of bookable slot starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySlots {
    pub date: String,
    pub slots: Vec<String>,
}
