mod usage_queries;

pub use usage_queries::{
    busy_hour_per_site, recent_usage, top_congested_cells, CongestedCellRow, SiteBusyHourRow,
};
