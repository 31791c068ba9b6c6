//! Pure, stateless statistics over materialized usage records.
//!
//! Every function borrows its input and returns a fresh result; nothing here
//! touches I/O or shared state, so calls on disjoint inputs may run in parallel.

pub mod busy_hour;
pub mod prime_time;
pub mod stats;
pub mod tables;

pub use busy_hour::{busy_hours_by_site, compute_busy_hour, truncate_to_hour, BusyHour};
pub use prime_time::{
    compute_prime_time_congestion, congested_records, rank_cells_in_window, top_congested_cells,
    CellCongestion, CongestedRecord, HourWindow,
};
pub use stats::{check_percentile, compute_percentile, Mean};
pub use tables::{
    busy_hour_of_day, compute_tables, kpis, site_hour, AnalysisTables, BusyHourOfDayRow, Kpis,
    TableName,
};
