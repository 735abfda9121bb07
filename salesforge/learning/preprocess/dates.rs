use chrono::{NaiveDate, NaiveDateTime};

/// Formats tried in order when parsing `Date` cells.
pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
];

/// Parses date cells against an ordered list of formats.
///
/// Unparseable cells become `None`; nothing is imputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateParser {
    formats: Vec<String>,
}

impl Default for DateParser {
    fn default() -> Self {
        Self::new(DEFAULT_DATE_FORMATS.iter().map(|fmt| (*fmt).to_owned()).collect())
    }
}

impl DateParser {
    /// Parser trying `formats` in order. An empty list falls back to the defaults.
    #[must_use]
    pub fn new(formats: Vec<String>) -> Self {
        if formats.is_empty() {
            return Self::default();
        }
        Self { formats }
    }

    /// Formats in trial order.
    #[must_use]
    pub fn formats(&self) -> &[String] {
        &self.formats
    }

    /// Parses one cell.
    #[must_use]
    pub fn parse(&self, raw: Option<&str>) -> Option<NaiveDate> {
        let text = raw?.trim();
        self.formats.iter().find_map(|fmt| {
            NaiveDate::parse_from_str(text, fmt)
                .ok()
                .or_else(|| NaiveDateTime::parse_from_str(text, fmt).ok().map(|dt| dt.date()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn parses_supported_formats() {
        let parser = DateParser::default();
        assert_eq!(parser.parse(Some("2023-04-05")), ymd(2023, 4, 5));
        assert_eq!(parser.parse(Some("2023-04-05 13:30:00")), ymd(2023, 4, 5));
        assert_eq!(parser.parse(Some("04/05/2023")), ymd(2023, 4, 5));
        assert_eq!(parser.parse(Some("05.04.2023")), ymd(2023, 4, 5));
    }

    #[test]
    fn invalid_dates_become_null() {
        let parser = DateParser::default();
        assert_eq!(parser.parse(Some("31/31/2023")), None);
        assert_eq!(parser.parse(Some("yesterday")), None);
        assert_eq!(parser.parse(None), None);
    }

    #[test]
    fn custom_formats_replace_defaults() {
        let parser = DateParser::new(vec!["%d/%m/%Y".into()]);
        assert_eq!(parser.parse(Some("05/04/2023")), ymd(2023, 4, 5));
        assert_eq!(parser.parse(Some("2023-04-05")), None);
    }
}
