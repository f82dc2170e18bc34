use std::sync::OnceLock;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

fn content_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"([0-9]{1,2})\.([0-9]{1,2})\.([0-9]{2,4})").expect("static date pattern")
    })
}

/// Fixed publication date for legacy paths whose pages carry no usable date.
///
/// `month` is zero-based and out-of-range values roll over into the following
/// year, matching the calendar arithmetic the dates were first recorded with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateOverride {
    pub path_suffix: String,
    pub year: i32,
    pub month: i32,
    pub day: i32,
}

impl DateOverride {
    pub fn date(&self) -> Option<DateTime<Utc>> {
        if !(0..=11).contains(&self.month) {
            warn!(
                path_suffix = %self.path_suffix,
                month = self.month,
                "date override month outside 0-11 rolls over"
            );
        }
        legacy_utc_date(self.year, self.month, self.day)
    }
}

/// Midnight UTC for a year / zero-based month / day triple.
///
/// Months and days outside their range roll over, and years 0-99 are read as
/// 1900-1999.
pub fn legacy_utc_date(year: i32, month0: i32, day: i32) -> Option<DateTime<Utc>> {
    let year = if (0..=99).contains(&year) { 1900 + year } else { year };
    let total_months = i64::from(year) * 12 + i64::from(month0);
    let year = i32::try_from(total_months.div_euclid(12)).ok()?;
    let month = u32::try_from(total_months.rem_euclid(12) + 1).ok()?;
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let date = first.checked_add_signed(Duration::days(i64::from(day) - 1))?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

/// First `d.m.yy`-style date found anywhere in `body`.
pub fn date_from_content(body: &str) -> Option<DateTime<Utc>> {
    let caps = content_date_pattern().captures(body)?;
    let day: i32 = caps[1].parse().ok()?;
    let month: i32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    legacy_utc_date(year, month - 1, day)
}

fn override_for(linktarget: &str, overrides: &[DateOverride]) -> Option<DateTime<Utc>> {
    overrides
        .iter()
        .find(|o| linktarget.ends_with(&o.path_suffix))
        .and_then(DateOverride::date)
}

/// Publication date of a legacy article: explicit date, then a date in the
/// body, then a per-path override. `None` means the caller's fallback applies.
pub fn infer_post_date(
    published: Option<DateTime<Utc>>,
    body: &str,
    linktarget: &str,
    overrides: &[DateOverride],
) -> Option<DateTime<Utc>> {
    published
        .or_else(|| date_from_content(body))
        .or_else(|| override_for(linktarget, overrides))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).single().unwrap()
    }

    #[test]
    fn two_digit_years_land_in_the_1900s() {
        assert_eq!(date_from_content("Kokous pidettiin 3.4.99"), Some(utc(1999, 4, 3)));
        assert_eq!(date_from_content("päivitetty 1.2.04"), Some(utc(1904, 2, 1)));
    }

    #[test]
    fn only_ascii_digits_form_a_date() {
        assert_eq!(date_from_content("٣.٤.٩٩ 3.4.99"), Some(utc(1999, 4, 3)));
        assert_eq!(date_from_content("٣.٤.٩٩"), None);
    }

    #[test]
    fn four_digit_years_are_used_as_is() {
        assert_eq!(date_from_content("<p>12.6.2004 Helsinki</p>"), Some(utc(2004, 6, 12)));
    }

    #[test]
    fn out_of_range_values_roll_over() {
        assert_eq!(date_from_content("31.2.2004"), Some(utc(2004, 3, 2)));
        assert_eq!(legacy_utc_date(2005, 12, 1), Some(utc(2006, 1, 1)));
        assert_eq!(legacy_utc_date(2005, 0, 0), Some(utc(2004, 12, 31)));
    }

    #[test]
    fn explicit_date_wins_over_body_date() {
        let explicit = utc(2001, 1, 1);
        let date = infer_post_date(Some(explicit), "<p>12.6.2004</p>", "a.html", &[]);
        assert_eq!(date, Some(explicit));
    }

    #[test]
    fn override_applies_only_without_other_dates() {
        let overrides = vec![DateOverride {
            path_suffix: "toimintasuunnitelma-2003.html".into(),
            year: 2003,
            month: 5,
            day: 13,
        }];
        assert_eq!(
            infer_post_date(None, "<p>ei päivää</p>", "yhdistys/toimintasuunnitelma-2003.html", &overrides),
            Some(utc(2003, 6, 13))
        );
        assert_eq!(
            infer_post_date(None, "<p>1.1.2003</p>", "yhdistys/toimintasuunnitelma-2003.html", &overrides),
            Some(utc(2003, 1, 1))
        );
        assert_eq!(infer_post_date(None, "<p>-</p>", "muu.html", &overrides), None);
    }
}
