use std::{fmt, str::FromStr};

use time::OffsetDateTime;

/// Radio access technology of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Tech {
    #[cfg_attr(feature = "serde", serde(rename = "4G"))]
    Lte,
    #[cfg_attr(feature = "serde", serde(rename = "5G"))]
    Nr,
}

impl Tech {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lte => "4G",
            Self::Nr => "5G",
        }
    }
}

impl fmt::Display for Tech {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown tech '{0}', expected 4G or 5G")]
pub struct ParseTechError(pub String);

impl FromStr for Tech {
    type Err = ParseTechError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "4G" | "LTE" => Ok(Self::Lte),
            "5G" | "NR" => Ok(Self::Nr),
            other => Err(ParseTechError(other.to_string())),
        }
    }
}

impl TryFrom<String> for Tech {
    type Error = ParseTechError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// One utilization measurement for a cell at a point in time.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UsageRecord {
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    pub region: Option<String>,
    pub city: Option<String>,
    pub site_id: String,
    pub cell_id: String,
    #[sqlx(try_from = "String")]
    pub tech: Tech,
    pub capacity_mbps: f64,
    pub throughput_mbps: f64,
    pub utilization_pct: f64,
    pub latency_ms: f64,
    pub packet_loss_pct: f64,
    #[sqlx(try_from = "i64")]
    pub users_active: u32,
}

/// Utilization as throughput over capacity in percent, clipped to [0, 100].
///
/// Returns `None` when capacity is zero, negative or not finite.
pub fn derive_utilization_pct(throughput_mbps: f64, capacity_mbps: f64) -> Option<f64> {
    if !capacity_mbps.is_finite() || capacity_mbps <= 0.0 || !throughput_mbps.is_finite() {
        return None;
    }
    Some((throughput_mbps / capacity_mbps * 100.0).clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tech_parses_case_insensitively() {
        assert_eq!("4g".parse::<Tech>(), Ok(Tech::Lte));
        assert_eq!(" 5G ".parse::<Tech>(), Ok(Tech::Nr));
        assert_eq!("lte".parse::<Tech>(), Ok(Tech::Lte));
        assert!("3G".parse::<Tech>().is_err());
    }

    #[test]
    fn tech_displays_generation_label() {
        assert_eq!(Tech::Lte.to_string(), "4G");
        assert_eq!(Tech::Nr.to_string(), "5G");
    }

    #[test]
    fn utilization_is_derived_and_clipped() {
        assert_eq!(derive_utilization_pct(50.0, 200.0), Some(25.0));
        assert_eq!(derive_utilization_pct(300.0, 200.0), Some(100.0));
        assert_eq!(derive_utilization_pct(10.0, 0.0), None);
        assert_eq!(derive_utilization_pct(f64::NAN, 100.0), None);
    }
}
