// Utils

pub mod logging;
pub mod metrics;
pub mod progress;
