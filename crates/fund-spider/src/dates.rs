use chrono::NaiveDate;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn parse_date(date: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(date.trim(), DATE_FORMAT)
}

/// Every calendar day from `start` to `end`, both inclusive; empty if `start > end`.
///
/// ```rust
/// use fund_spider::dates::date_range;
///
/// let days = date_range("2024-02-28", "2024-03-01").unwrap();
/// assert_eq!(days.len(), 3); // leap year
/// ```
pub fn date_range(start: &str, end: &str) -> Result<Vec<NaiveDate>, chrono::ParseError> {
    let start = parse_date(start)?;
    let end = parse_date(end)?;
    Ok(start.iter_days().take_while(|day| *day <= end).collect())
}
