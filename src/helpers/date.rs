//! Date helper functions

use chrono::{DateTime, Datelike, TimeZone, Utc};

const MONTHS_PT_BR: [&str; 12] = [
    "jan", "fev", "mar", "abr", "mai", "jun", "jul", "ago", "set", "out", "nov", "dez",
];

/// Format a publication date for display, e.g. `15 mar 2021`
///
/// # Examples
/// ```ignore
/// format_date(&date, &chrono_tz::America::Sao_Paulo, "pt-BR") // -> "15 mar 2021"
/// format_date(&date, &chrono_tz::UTC, "en")                     // -> "15 Mar 2021"
/// ```
pub fn format_date<Tz: TimeZone>(date: &DateTime<Utc>, tz: &Tz, language: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let local = date.with_timezone(tz);
    let month = local.month0() as usize;
    let month = if is_portuguese(language) {
        MONTHS_PT_BR[month].to_string()
    } else {
        local.format("%b").to_string()
    };
    format!("{} {} {}", local.day(), month, local.year())
}

/// Format a date with its time, e.g. `19 mar 2021, às 20:10`
pub fn format_date_time<Tz: TimeZone>(date: &DateTime<Utc>, tz: &Tz, language: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let time = date.with_timezone(tz).format("%H:%M");
    let joiner = if is_portuguese(language) { "às" } else { "at" };
    format!("{}, {} {}", format_date(date, tz, language), joiner, time)
}

/// Format a date in ISO 8601 / XML format
pub fn date_xml(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string()
}

fn is_portuguese(language: &str) -> bool {
    language.to_ascii_lowercase().starts_with("pt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_date_pt_br() {
        let date = Utc.with_ymd_and_hms(2021, 3, 15, 19, 25, 28).unwrap();
        assert_eq!(format_date(&date, &chrono_tz::UTC, "pt-BR"), "15 mar 2021");
        assert_eq!(format_date(&date, &chrono_tz::UTC, "en"), "15 Mar 2021");
    }

    #[test]
    fn test_format_date_uses_timezone() {
        // 01:00 UTC is still the previous day in Sao Paulo (UTC-3)
        let date = Utc.with_ymd_and_hms(2021, 4, 1, 1, 0, 0).unwrap();
        assert_eq!(
            format_date(&date, &chrono_tz::America::Sao_Paulo, "pt-BR"),
            "31 mar 2021"
        );
    }

    #[test]
    fn test_format_date_time() {
        let date = Utc.with_ymd_and_hms(2021, 3, 19, 23, 10, 0).unwrap();
        assert_eq!(
            format_date_time(&date, &chrono_tz::America::Sao_Paulo, "pt-BR"),
            "19 mar 2021, às 20:10"
        );
        assert_eq!(
            format_date_time(&date, &chrono_tz::UTC, "en"),
            "19 Mar 2021, at 23:10"
        );
    }

    #[test]
    fn test_date_xml() {
        let date = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(date_xml(&date), "2024-01-15T10:30:00.000+00:00");
    }
}
