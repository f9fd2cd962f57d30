use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::process;

/// A dose as typed on the command line: `"100mg"`, `"~2.5 g"`, `"100"`, or `"?"` for unknown.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DoseArg {
    pub dose: Option<f64>,
    pub units: Option<String>,
    pub is_estimate: bool,
}

pub(crate) fn parse_dose(s: &str) -> Result<DoseArg> {
    let s = s.trim();
    let (is_estimate, rest) = match s.strip_prefix('~') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, s),
    };

    if rest == "?" || rest.eq_ignore_ascii_case("unknown") {
        return Ok(DoseArg {
            dose: None,
            units: None,
            is_estimate,
        });
    }

    let (number, units) = match split_number_unit(rest) {
        Some((qty, unit)) => (qty, Some(unit.trim().to_string())),
        None => (
            rest.parse::<f64>()
                .with_context(|| format!("Invalid dose '{s}'. Use e.g. '100mg', '~2 g' or '?'"))?,
            None,
        ),
    };
    if !number.is_finite() || number < 0.0 {
        bail!("Dose must be a non-negative number");
    }
    Ok(DoseArg {
        dose: Some(number),
        units,
        is_estimate,
    })
}

/// Split "100mg" or "2.5 ml" into (100.0, "mg") or (2.5, "ml").
fn split_number_unit(s: &str) -> Option<(f64, &str)> {
    let idx = s.find(|c: char| c.is_alphabetic() || c == 'µ')?;
    if idx == 0 {
        return None;
    }
    let (num_part, unit_part) = s.split_at(idx);
    let qty: f64 = num_part.trim().parse().ok()?;
    Some((qty, unit_part))
}

/// Parse when something happened, relative to `now`'s timezone.
///
/// Accepts `now`, relative offsets (`-30m`, `-2h`, `-1d`), a time today (`21:30`), a local
/// date and time (`2026-04-04 21:30`), or RFC 3339.
pub(crate) fn parse_when_in<Tz: TimeZone>(s: &str, now: &DateTime<Tz>) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() || s == "now" {
        return Ok(now.with_timezone(&Utc));
    }
    if let Some(offset) = s.strip_prefix('-') {
        return Ok(now.with_timezone(&Utc) - parse_offset(offset)?);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = if let Ok(time) = NaiveTime::parse_from_str(s, "%H:%M") {
        now.date_naive().and_time(time)
    } else {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
            .with_context(|| {
                format!("Invalid time '{s}'. Use now, -30m, HH:MM, 'YYYY-MM-DD HH:MM' or RFC 3339")
            })?
    };
    now.timezone()
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("'{s}' does not exist in the local timezone"))
}

pub(crate) fn parse_when(s: Option<&str>) -> Result<DateTime<Utc>> {
    parse_when_in(s.unwrap_or("now"), &Local::now())
}

fn parse_offset(s: &str) -> Result<Duration> {
    let (num, unit) = s.split_at(s.len().saturating_sub(1));
    let n: i64 = num
        .parse()
        .with_context(|| format!("Invalid offset '-{s}'. Use e.g. -30m, -2h or -1d"))?;
    match unit {
        "m" => Ok(Duration::minutes(n)),
        "h" => Ok(Duration::hours(n)),
        "d" => Ok(Duration::days(n)),
        _ => bail!("Invalid offset unit in '-{s}'. Use m, h or d"),
    }
}

/// Start of the window covering the last `days` days, or `None` for all time.
pub(crate) fn since_days(days: Option<u32>) -> Option<DateTime<Utc>> {
    days.map(|d| Utc::now() - Duration::days(i64::from(d)))
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{s}'. Use YYYY-MM-DD"))
}

pub(crate) fn format_local(dt: &DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

pub(crate) fn format_dose(dose: Option<f64>, units: &str, is_estimate: bool) -> String {
    let estimate = if is_estimate { "~" } else { "" };
    match dose {
        Some(d) if d.fract() == 0.0 => format!("{estimate}{d:.0} {units}"),
        Some(d) => format!("{estimate}{d} {units}"),
        None => format!("? {units}"),
    }
}

pub(crate) fn prompt_choice(what: &str, count: usize) -> Result<usize> {
    eprint!("\nSelect a {what} (1-{count}): ");
    io::stderr().flush()?;
    let stdin = io::stdin();
    let line = stdin.lock().lines().next().context("No input")??;
    let n: usize = line.trim().parse().context("Invalid number")?;
    if n < 1 || n > count {
        bail!("Selection out of range");
    }
    Ok(n - 1)
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// Report a missing record and exit with status 2.
pub(crate) fn exit_not_found(message: &str, json: bool) -> ! {
    if json {
        println!("{}", json_error(message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn dose(d: Option<f64>, units: Option<&str>, is_estimate: bool) -> DoseArg {
        DoseArg {
            dose: d,
            units: units.map(ToString::to_string),
            is_estimate,
        }
    }

    #[test]
    fn test_parse_dose() {
        assert_eq!(parse_dose("100mg").unwrap(), dose(Some(100.0), Some("mg"), false));
        assert_eq!(parse_dose("2.5 ml").unwrap(), dose(Some(2.5), Some("ml"), false));
        assert_eq!(parse_dose("150µg").unwrap(), dose(Some(150.0), Some("µg"), false));
        assert_eq!(parse_dose("40").unwrap(), dose(Some(40.0), None, false));
    }

    #[test]
    fn test_parse_dose_estimate_and_unknown() {
        assert_eq!(parse_dose("~20mg").unwrap(), dose(Some(20.0), Some("mg"), true));
        assert_eq!(parse_dose("?").unwrap(), dose(None, None, false));
        assert_eq!(parse_dose("~unknown").unwrap(), dose(None, None, true));
    }

    #[test]
    fn test_parse_dose_invalid() {
        assert!(parse_dose("lots").is_err());
        assert!(parse_dose("-5mg").is_err());
        assert!(parse_dose("").is_err());
    }

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 4, 4, 22, 15, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_when_now_and_relative() {
        let now = now();
        assert_eq!(parse_when_in("now", &now).unwrap(), now.with_timezone(&Utc));
        assert_eq!(
            parse_when_in("-30m", &now).unwrap(),
            now.with_timezone(&Utc) - Duration::minutes(30)
        );
        assert_eq!(
            parse_when_in("-2h", &now).unwrap(),
            now.with_timezone(&Utc) - Duration::hours(2)
        );
        assert!(parse_when_in("-2w", &now).is_err());
    }

    #[test]
    fn test_parse_when_local_times() {
        let now = now();
        assert_eq!(
            parse_when_in("21:30", &now).unwrap(),
            Utc.with_ymd_and_hms(2026, 4, 4, 19, 30, 0).unwrap()
        );
        assert_eq!(
            parse_when_in("2026-04-01 08:00", &now).unwrap(),
            Utc.with_ymd_and_hms(2026, 4, 1, 6, 0, 0).unwrap()
        );
        assert_eq!(
            parse_when_in("2026-04-01T08:00:00Z", &now).unwrap(),
            Utc.with_ymd_and_hms(2026, 4, 1, 8, 0, 0).unwrap()
        );
        assert!(parse_when_in("yesterday-ish", &now).is_err());
    }

    #[test]
    fn test_format_dose() {
        assert_eq!(format_dose(Some(100.0), "mg", false), "100 mg");
        assert_eq!(format_dose(Some(2.5), "g", true), "~2.5 g");
        assert_eq!(format_dose(None, "mg", false), "? mg");
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2026-05-01").unwrap(),
            NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()
        );
        assert!(parse_date("May 1").is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
        assert_eq!(truncate("Psilocybin mushrooms", 12), "Psilocybi...");
    }

    #[test]
    fn test_json_error_escapes() {
        assert_eq!(json_error("bad \"x\""), r#"{"error":"bad \"x\""}"#);
    }
}
