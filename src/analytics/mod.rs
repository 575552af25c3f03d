//! Deterministic derivations over stored time series. Everything in this
//! module is a pure function of store reads; no I/O happens here.

pub mod compare;
pub mod insights;
pub mod metrics;
pub mod prompt;
pub mod simulate;

pub use compare::{compare_series, ComparisonResult};
pub use insights::{build_insights, Insights, Strategy};
pub use metrics::{compute_metrics, PriceMetrics};
pub use simulate::{
    run_dca, run_lump_sum, run_portfolio, DcaMonthRow, DcaResult, LumpSumResult, PortfolioHolding,
    PortfolioResult,
};
