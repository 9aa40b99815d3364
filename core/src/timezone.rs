//! Time zone tokens (`[+-]HH:?MM`, `GMT`, `UTC`) and the inline `#tz:` marker
//! embedded in dive tags and site notes.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{FixedOffset, Local, Offset};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::errors::TimeZoneError;

static TZ_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"^(?:(?P<sign>[+-])?(?P<hours>\d{2}):?(?P<minutes>\d{2})|GMT|UTC)$")
        .case_insensitive(true)
        .build()
        .unwrap()
});

static TZ_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"#tz:(?P<token>[+-]?[A-Z\d:]+)")
        .case_insensitive(true)
        .build()
        .unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeZone {
    token: String,
    offset: FixedOffset,
}

impl TimeZone {
    pub fn utc() -> Self {
        Self {
            token: "GMT".to_string(),
            offset: FixedOffset::east_opt(0).unwrap_or(Offset::fix(&chrono::Utc)),
        }
    }

    /// Builds a token from an offset in seconds east of UTC, e.g. `-10800` => `-0300`.
    ///
    /// A zero offset is spelled `GMT`.
    pub fn from_offset(offset: FixedOffset) -> Self {
        let seconds = offset.local_minus_utc();
        if seconds == 0 {
            return Self::utc();
        }
        let sign = if seconds < 0 { '-' } else { '+' };
        let minutes = seconds.abs() / 60;
        Self {
            token: format!("{sign}{:02}{:02}", minutes / 60, minutes % 60),
            offset,
        }
    }

    /// Host local offset at the time of the call.
    pub fn system() -> Self {
        Self::from_offset(Local::now().offset().fix())
    }

    /// Rough offset for a longitude (15 degrees per hour), e.g. `-46.6` => `-0300`.
    pub fn from_longitude(longitude: f64) -> Self {
        let hours = (longitude / 15.0).round() as i32;
        let sign = if hours < 0 { '-' } else { '+' };
        let token = format!("{sign}{:02}00", hours.abs());
        let offset = FixedOffset::east_opt(hours * 3600).unwrap_or(Offset::fix(&chrono::Utc));
        Self { token, offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl FromStr for TimeZone {
    type Err = TimeZoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        let captures = TZ_TOKEN_RE
            .captures(token)
            .ok_or_else(|| TimeZoneError::Invalid(token.to_string()))?;

        let (hours, minutes) = match (captures.name("hours"), captures.name("minutes")) {
            (Some(h), Some(m)) => (
                h.as_str().parse::<i32>().unwrap_or_default(),
                m.as_str().parse::<i32>().unwrap_or_default(),
            ),
            // GMT / UTC
            _ => (0, 0),
        };
        if minutes > 59 {
            return Err(TimeZoneError::OutOfRange(token.to_string()));
        }

        let sign = match captures.name("sign").map(|v| v.as_str()) {
            Some("-") => -1,
            _ => 1,
        };
        let offset = FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .ok_or_else(|| TimeZoneError::OutOfRange(token.to_string()))?;

        Ok(Self {
            token: token.to_string(),
            offset,
        })
    }
}

impl Display for TimeZone {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token)
    }
}

/// Returns the token of the first `#tz:<token>` marker in `text`, unvalidated.
pub fn find_marker(text: &str) -> Option<&str> {
    TZ_MARKER_RE
        .captures(text)
        .and_then(|c| c.name("token"))
        .map(|m| m.as_str())
}

/// Replaces the first marker in `text` with `#tz:<tz>`, or appends one using
/// `separator` when there is none.
pub fn with_marker(text: &str, tz: &TimeZone, separator: &str) -> String {
    let marker = format!("#tz:{tz}");
    if TZ_MARKER_RE.is_match(text) {
        return TZ_MARKER_RE.replace(text, marker.as_str()).into_owned();
    }

    let text = text.trim_end();
    if text.is_empty() {
        marker
    } else {
        format!("{text}{separator}{marker}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tz(token: &str) -> TimeZone {
        token.parse().unwrap()
    }

    #[test]
    fn test_parse_tokens() {
        assert_eq!(tz("-0300").offset().local_minus_utc(), -3 * 3600);
        assert_eq!(tz("+05:30").offset().local_minus_utc(), 5 * 3600 + 30 * 60);
        assert_eq!(tz("0100").offset().local_minus_utc(), 3600);
        assert_eq!(tz("gmt").offset().local_minus_utc(), 0);
        assert_eq!(tz("UTC").offset().local_minus_utc(), 0);
        assert_eq!(tz("+0000").to_string(), "+0000");
    }

    #[test]
    fn test_parse_invalid_tokens() {
        assert!(matches!(
            "-03".parse::<TimeZone>(),
            Err(TimeZoneError::Invalid(_))
        ));
        assert!(matches!(
            "EST".parse::<TimeZone>(),
            Err(TimeZoneError::Invalid(_))
        ));
        assert!(matches!(
            "+0300abc".parse::<TimeZone>(),
            Err(TimeZoneError::Invalid(_))
        ));
        assert!(matches!(
            "+0175".parse::<TimeZone>(),
            Err(TimeZoneError::OutOfRange(_))
        ));
        assert!(matches!(
            "+9900".parse::<TimeZone>(),
            Err(TimeZoneError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_from_longitude() {
        assert_eq!(TimeZone::from_longitude(-46.6).to_string(), "-0300");
        assert_eq!(TimeZone::from_longitude(139.7).to_string(), "+0900");
        assert_eq!(TimeZone::from_longitude(-3.0).to_string(), "+0000");
        assert_eq!(
            TimeZone::from_longitude(-46.6).offset().local_minus_utc(),
            -3 * 3600
        );
    }

    #[test]
    fn test_from_offset() {
        let offset = FixedOffset::west_opt(3 * 3600 + 30 * 60).unwrap();
        assert_eq!(TimeZone::from_offset(offset).to_string(), "-0330");
        let offset = FixedOffset::east_opt(0).unwrap();
        assert_eq!(TimeZone::from_offset(offset).to_string(), "GMT");
        assert!(TimeZone::system().to_string().parse::<TimeZone>().is_ok());
    }

    #[test]
    fn test_markers() {
        assert_eq!(find_marker("boat, #tz:-0300, night"), Some("-0300"));
        assert_eq!(find_marker("Nice reef #TZ:+05:30"), Some("+05:30"));
        assert_eq!(find_marker("#tz:bogus"), Some("bogus"));
        assert_eq!(find_marker("no marker here"), None);

        let utc = tz("UTC");
        assert_eq!(with_marker("", &utc, ", "), "#tz:UTC");
        assert_eq!(with_marker("boat", &utc, ", "), "boat, #tz:UTC");
        assert_eq!(with_marker("boat, #tz:-0300", &utc, ", "), "boat, #tz:UTC");
    }
}
