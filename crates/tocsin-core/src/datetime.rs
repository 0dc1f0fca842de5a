use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str = "tocsin-time.toml";
const TIMEZONE_ENV_VAR: &str = "TOCSIN_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str = "TOCSIN_TIME_CONFIG";
const DEFAULT_PROJECT_TIMEZONE: &str = "Asia/Kolkata";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
    timezone: Option<String>,
    time: Option<TimezoneSection>,
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
    timezone: Option<String>,
}

/// The zone every "local midnight" computation uses. Resolved once per
/// process: env var, then config file, then the built-in default.
pub fn project_timezone() -> &'static Tz {
    static PROJECT_TZ: OnceLock<Tz> = OnceLock::new();
    PROJECT_TZ.get_or_init(resolve_project_timezone)
}

#[must_use]
pub fn to_project_date(dt: DateTime<Utc>) -> NaiveDate {
    dt.with_timezone(project_timezone()).date_naive()
}

#[must_use]
pub fn canonical(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn resolve_project_timezone() -> Tz {
    if let Ok(raw) = std::env::var(TIMEZONE_ENV_VAR) {
        if let Some(tz) = parse_timezone(&raw, TIMEZONE_ENV_VAR) {
            return tz;
        }
    }

    if let Some(path) = timezone_config_path() {
        if let Some(tz) = load_timezone_from_file(&path) {
            return tz;
        }
    }

    parse_timezone(DEFAULT_PROJECT_TIMEZONE, "DEFAULT_PROJECT_TIMEZONE").unwrap_or_else(|| {
        tracing::error!("failed to parse fallback timezone; using UTC");
        chrono_tz::UTC
    })
}

fn timezone_config_path() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var(TIMEZONE_CONFIG_ENV_VAR) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    std::env::current_dir()
        .ok()
        .map(|dir| dir.join(TIMEZONE_CONFIG_FILE))
}

fn load_timezone_from_file(path: &PathBuf) -> Option<Tz> {
    if !path.exists() {
        return None;
    }

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::error!(file = %path.display(), error = %err, "failed reading timezone config");
            return None;
        }
    };

    let parsed = match toml::from_str::<TimezoneConfig>(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::error!(file = %path.display(), error = %err, "failed parsing timezone config");
            return None;
        }
    };

    let timezone = parsed
        .timezone
        .or_else(|| parsed.time.and_then(|section| section.timezone));
    let Some(timezone) = timezone else {
        tracing::warn!(file = %path.display(), "timezone config had no timezone field");
        return None;
    };

    parse_timezone(timezone.as_str(), &format!("file:{}", path.display()))
}

fn parse_timezone(raw: &str, source: &str) -> Option<Tz> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match trimmed.parse::<Tz>() {
        Ok(tz) => {
            tracing::info!(source, timezone = %trimmed, "configured project timezone");
            Some(tz)
        }
        Err(err) => {
            tracing::error!(source, timezone = %trimmed, error = %err, "failed to parse timezone id");
            None
        }
    }
}

fn to_utc_from_project_local(
    local_naive: NaiveDateTime,
    context: &str,
) -> anyhow::Result<DateTime<Utc>> {
    match project_timezone().from_local_datetime(&local_naive) {
        LocalResult::Single(local_dt) => Ok(local_dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(first, second) => {
            tracing::warn!(
                context,
                first = %first,
                second = %second,
                "ambiguous local datetime; using earliest"
            );
            let chosen = if first <= second { first } else { second };
            Ok(chosen.with_timezone(&Utc))
        }
        LocalResult::None => Err(anyhow!(
            "local datetime does not exist in configured timezone: {context}"
        )),
    }
}

/// The instant at which the given calendar date begins in the project zone.
pub fn due_midnight_utc(due: NaiveDate) -> anyhow::Result<DateTime<Utc>> {
    let midnight = due
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("failed to construct midnight for {due}"))?;
    to_utc_from_project_local(midnight, "due-midnight")
}

/// Canonicalizes heterogeneous due-date input, or rejects it as "no due
/// date". Grammars are tried in priority order; the first grammar whose
/// shape matches decides the outcome, so `2024-02-30` is rejected outright
/// rather than falling through or rolling over into March.
pub fn normalize_due_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let token = raw.trim();
    if token.is_empty() {
        return None;
    }

    // YYYY-M-D
    let ymd = Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").ok()?;
    if let Some(caps) = ymd.captures(token) {
        return NaiveDate::from_ymd_opt(
            capture_num(&caps, 1)?,
            capture_num(&caps, 2)?,
            capture_num(&caps, 3)?,
        );
    }

    // D/M/YYYY
    let dmy_slash = Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").ok()?;
    if let Some(caps) = dmy_slash.captures(token) {
        return NaiveDate::from_ymd_opt(
            capture_num(&caps, 3)?,
            capture_num(&caps, 2)?,
            capture_num(&caps, 1)?,
        );
    }

    // D-M-YYYY, told apart from the first grammar by the year position
    let dmy_hyphen = Regex::new(r"^(\d{1,2})-(\d{1,2})-(\d{4})$").ok()?;
    if let Some(caps) = dmy_hyphen.captures(token) {
        return NaiveDate::from_ymd_opt(
            capture_num(&caps, 3)?,
            capture_num(&caps, 2)?,
            capture_num(&caps, 1)?,
        );
    }

    // Bare day number: a day of the current month, clamped, never rejected
    if token.len() <= 2 && token.chars().all(|c| c.is_ascii_digit()) {
        let day: u32 = token.parse().ok()?;
        let day = day.clamp(1, last_day_of_month(today));
        return NaiveDate::from_ymd_opt(today.year(), today.month(), day);
    }

    for fmt in ["%Y/%m/%d", "%d %b %Y", "%d %B %Y", "%B %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(token, fmt) {
            return Some(date);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
        return Some(dt.date_naive());
    }

    None
}

fn capture_num<T: std::str::FromStr>(caps: &regex::Captures<'_>, idx: usize) -> Option<T> {
    caps.get(idx)?.as_str().parse().ok()
}

fn last_day_of_month(date: NaiveDate) -> u32 {
    let (year, month) = (date.year(), date.month());
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    first_of_next
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

pub mod due_date_serde {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(value) => serializer.serialize_str(&super::canonical(*value)),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        match NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            Ok(date) => Ok(Some(date)),
            Err(err) => {
                tracing::warn!(value = %trimmed, error = %err, "discarding unparseable stored due date");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{canonical, due_midnight_utc, last_day_of_month, normalize_due_date};

    fn day(year: i32, month: u32, dom: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, dom).expect("valid date")
    }

    #[test]
    fn same_date_in_every_grammar_yields_one_canonical_form() {
        let today = day(2026, 3, 15);
        let a = normalize_due_date("2026-4-5", today).expect("ymd");
        let b = normalize_due_date("5/4/2026", today).expect("dmy slash");
        let c = normalize_due_date("5-4-2026", today).expect("dmy hyphen");
        assert_eq!(canonical(a), "2026-04-05");
        assert_eq!(canonical(a), canonical(b));
        assert_eq!(canonical(b), canonical(c));
    }

    #[test]
    fn impossible_calendar_dates_are_rejected_not_rolled_over() {
        let today = day(2026, 3, 15);
        assert_eq!(normalize_due_date("2024-02-30", today), None);
        assert_eq!(normalize_due_date("31-04-2024", today), None);
        assert_eq!(normalize_due_date("13/13/2024", today), None);
        assert_eq!(normalize_due_date("2024-13-01", today), None);
    }

    #[test]
    fn bare_day_number_lands_in_the_current_month() {
        let today = day(2026, 1, 20);
        assert_eq!(normalize_due_date("5", today), Some(day(2026, 1, 5)));
    }

    #[test]
    fn bare_day_number_clamps_to_month_end() {
        let today = day(2026, 4, 10);
        assert_eq!(normalize_due_date("31", today), Some(day(2026, 4, 30)));
        assert_eq!(normalize_due_date("0", today), Some(day(2026, 4, 1)));
    }

    #[test]
    fn fallback_formats_parse_real_dates_only() {
        let today = day(2026, 3, 15);
        assert_eq!(
            normalize_due_date("2026/04/05", today),
            Some(day(2026, 4, 5))
        );
        assert_eq!(
            normalize_due_date("5 Apr 2026", today),
            Some(day(2026, 4, 5))
        );
        assert_eq!(normalize_due_date("not a date", today), None);
        assert_eq!(normalize_due_date("", today), None);
        assert_eq!(normalize_due_date("   ", today), None);
    }

    #[test]
    fn last_day_handles_leap_years() {
        assert_eq!(last_day_of_month(day(2024, 2, 1)), 29);
        assert_eq!(last_day_of_month(day(2025, 2, 1)), 28);
        assert_eq!(last_day_of_month(day(2026, 12, 5)), 31);
    }

    #[test]
    fn due_midnight_is_zone_local() {
        // Default zone is Asia/Kolkata (UTC+05:30) unless overridden.
        let instant = due_midnight_utc(day(2026, 3, 10)).expect("midnight");
        assert_eq!(instant.to_rfc3339(), "2026-03-09T18:30:00+00:00");
    }
}
