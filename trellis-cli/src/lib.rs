pub mod app;
pub mod telemetry;
