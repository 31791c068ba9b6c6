mod usage_record;

pub use usage_record::{derive_utilization_pct, ParseTechError, Tech, UsageRecord};
