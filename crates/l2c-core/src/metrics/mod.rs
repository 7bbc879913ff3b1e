//! Write-path metrics.

mod prometheus;

pub use prometheus::WriteMetrics;
