pub mod usage_csv_file;
pub mod usage_db;

pub use usage_csv_file::{parse_timestamp, UsageCsvFileSource, REQUIRED_COLUMNS};
pub use usage_db::{RowLimitPolicy, UsageDbSource};
