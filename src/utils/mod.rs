pub mod metrics;
pub mod export;
pub mod millis;
