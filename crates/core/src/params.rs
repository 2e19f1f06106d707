//! Query-string validation shared by the time-windowed endpoints.
//!
//! Every endpoint that takes a window accepts Unix-second `start`/`end`
//! timestamps and, where bucketing applies, an `interval` such as `30s` or `1h`.
//! All problems are collected so the caller can return them in a single 400.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// A parameter an endpoint requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Start,
    End,
    Interval,
    Render,
}

/// Raw query-string values, exactly as received.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawParams {
    #[serde(default, alias = "start_time")]
    pub start: Option<String>,
    #[serde(default, alias = "end_time")]
    pub end: Option<String>,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub render: Option<String>,
}

/// Parameters that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedParams {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub interval: Option<Interval>,
    pub render: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
}

impl IntervalUnit {
    fn suffix(self) -> char {
        match self {
            IntervalUnit::Second => 's',
            IntervalUnit::Minute => 'm',
            IntervalUnit::Hour => 'h',
            IntervalUnit::Day => 'd',
            IntervalUnit::Week => 'w',
        }
    }

    fn seconds(self) -> i64 {
        match self {
            IntervalUnit::Second => 1,
            IntervalUnit::Minute => 60,
            IntervalUnit::Hour => 3_600,
            IntervalUnit::Day => 86_400,
            IntervalUnit::Week => 604_800,
        }
    }
}

/// Histogram bucket width, e.g. `3600s` or `1d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub count: u32,
    pub unit: IntervalUnit,
}

impl Interval {
    pub fn as_seconds(&self) -> i64 {
        i64::from(self.count) * self.unit.seconds()
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

impl FromStr for Interval {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let unit = match chars.next_back() {
            Some('s') => IntervalUnit::Second,
            Some('m') => IntervalUnit::Minute,
            Some('h') => IntervalUnit::Hour,
            Some('d') => IntervalUnit::Day,
            Some('w') => IntervalUnit::Week,
            _ => return Err(()),
        };
        let count: u32 = chars.as_str().parse().map_err(|_| ())?;
        if count == 0 {
            return Err(());
        }
        Ok(Interval { count, unit })
    }
}

/// Parse integer Unix seconds into a UTC datetime.
pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let secs: i64 = ts.trim().parse().ok()?;
    let dt = Utc.timestamp_opt(secs, 0).single();
    debug!(ts, parsed = ?dt, "Parsed timestamp");
    dt
}

fn missing(name: &str) -> String {
    format!("parameter missing [{name}]")
}

fn malformed(name: &str) -> String {
    format!("malformed parameter [{name}]")
}

/// `"true"`, `"TRUE"` and `"True"` are all accepted, as is the `False` family.
fn parse_render(raw: &str) -> Option<bool> {
    let mut chars = raw.chars();
    let normalised = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    };
    match normalised.as_str() {
        "True" => Some(true),
        "False" => Some(false),
        _ => None,
    }
}

/// Validate the parameters named in `required`.
///
/// `start` is only parsed once `end` parsed cleanly, so a bad `end` reports
/// one error rather than two.
pub fn validate(required: &[Param], raw: &RawParams) -> Result<ValidatedParams, Vec<String>> {
    let mut errors = Vec::new();
    let mut validated = ValidatedParams {
        start: None,
        end: None,
        interval: None,
        render: true,
    };

    let wants = |p: Param| required.contains(&p);

    if wants(Param::Start) && raw.start.is_none() {
        errors.push(missing("start"));
    }

    if wants(Param::End) {
        match raw.end.as_deref() {
            None => errors.push(missing("end")),
            Some(end) => match parse_timestamp(end) {
                None => errors.push(malformed("end")),
                Some(end_dt) => {
                    validated.end = Some(end_dt);
                    if wants(Param::Start) {
                        if let Some(start) = raw.start.as_deref() {
                            match parse_timestamp(start) {
                                Some(start_dt) if start_dt <= end_dt => {
                                    validated.start = Some(start_dt)
                                }
                                _ => errors.push(malformed("start")),
                            }
                        }
                    }
                }
            },
        }
    } else if wants(Param::Start) {
        if let Some(start) = raw.start.as_deref() {
            match parse_timestamp(start) {
                Some(start_dt) => validated.start = Some(start_dt),
                None => errors.push(malformed("start")),
            }
        }
    }

    if wants(Param::Interval) {
        match raw.interval.as_deref() {
            None => errors.push(missing("interval")),
            Some(interval) => match interval.parse::<Interval>() {
                Ok(parsed) => validated.interval = Some(parsed),
                Err(()) => errors.push(malformed("interval")),
            },
        }
    }

    if wants(Param::Render) {
        match parse_render(raw.render.as_deref().unwrap_or("True")) {
            Some(render) => validated.render = render,
            None => errors.push(malformed("render")),
        }
    }

    if errors.is_empty() {
        Ok(validated)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(start: Option<&str>, end: Option<&str>, interval: Option<&str>) -> RawParams {
        RawParams {
            start: start.map(String::from),
            end: end.map(String::from),
            interval: interval.map(String::from),
            render: None,
        }
    }

    const WINDOW: &[Param] = &[Param::Start, Param::End, Param::Interval];

    #[test]
    fn test_valid_window() {
        let v = validate(WINDOW, &raw(Some("1388534400"), Some("1388620800"), Some("3600s"))).unwrap();
        assert_eq!(v.start.unwrap().timestamp(), 1_388_534_400);
        assert_eq!(v.end.unwrap().timestamp(), 1_388_620_800);
        assert_eq!(v.interval.unwrap().to_string(), "3600s");
        assert_eq!(v.interval.unwrap().as_seconds(), 3600);
        assert!(v.render);
    }

    #[test]
    fn test_all_missing() {
        let errors = validate(WINDOW, &RawParams::default()).unwrap_err();
        assert_eq!(
            errors,
            vec![
                "parameter missing [start]",
                "parameter missing [end]",
                "parameter missing [interval]",
            ]
        );
    }

    #[test]
    fn test_malformed_end_skips_start() {
        let errors = validate(WINDOW, &raw(Some("junk"), Some("later"), Some("1h"))).unwrap_err();
        assert_eq!(errors, vec!["malformed parameter [end]"]);
    }

    #[test]
    fn test_malformed_start_and_interval() {
        let errors = validate(WINDOW, &raw(Some("junk"), Some("1388620800"), Some("10y"))).unwrap_err();
        assert_eq!(
            errors,
            vec!["malformed parameter [start]", "malformed parameter [interval]"]
        );
    }

    #[test]
    fn test_start_after_end_rejected() {
        let errors =
            validate(WINDOW, &raw(Some("1388620800"), Some("1388534400"), Some("1h"))).unwrap_err();
        assert_eq!(errors, vec!["malformed parameter [start]"]);
    }

    #[test]
    fn test_interval_parsing() {
        assert!("5m".parse::<Interval>().is_ok());
        assert!("2w".parse::<Interval>().is_ok());
        assert!("m".parse::<Interval>().is_err());
        assert!("0s".parse::<Interval>().is_err());
        assert!("1.5h".parse::<Interval>().is_err());
        assert!("".parse::<Interval>().is_err());
    }

    #[test]
    fn test_render_flag() {
        let mut params = raw(None, None, None);
        params.render = Some("false".into());
        assert!(!validate(&[Param::Render], &params).unwrap().render);

        params.render = Some("TRUE".into());
        assert!(validate(&[Param::Render], &params).unwrap().render);

        params.render = Some("yes".into());
        assert_eq!(
            validate(&[Param::Render], &params).unwrap_err(),
            vec!["malformed parameter [render]"]
        );
    }
}
