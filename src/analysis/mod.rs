//! Numeric core: reference statistics, baseline sampling, and the
//! reconstruction model.

pub mod baseline;
pub mod features;
pub mod model;
pub mod stats;
