use network_client::domain::{Tech, UsageRecord};
use time::{macros::format_description, Date};

/// Selection applied before aggregation. Empty lists mean "everything".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageFilter {
    /// First included calendar day.
    pub from: Option<Date>,
    /// Last included calendar day.
    pub to: Option<Date>,
    pub techs: Vec<Tech>,
    pub regions: Vec<String>,
    pub cities: Vec<String>,
    pub sites: Vec<String>,
}

impl UsageFilter {
    pub fn matches(&self, r: &UsageRecord) -> bool {
        let day = r.timestamp.date();
        self.from.map_or(true, |from| day >= from)
            && self.to.map_or(true, |to| day <= to)
            && (self.techs.is_empty() || self.techs.contains(&r.tech))
            && matches_opt(&self.regions, r.region.as_deref())
            && matches_opt(&self.cities, r.city.as_deref())
            && (self.sites.is_empty() || self.sites.iter().any(|s| *s == r.site_id))
    }
}

fn matches_opt(allowed: &[String], value: Option<&str>) -> bool {
    allowed.is_empty() || value.is_some_and(|v| allowed.iter().any(|a| a == v))
}

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> Result<Date, time::error::Parse> {
    Date::parse(s.trim(), format_description!("[year]-[month]-[day]"))
}

/// Splits a comma separated list, dropping blanks.
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
