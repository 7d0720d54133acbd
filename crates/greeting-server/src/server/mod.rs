pub mod config;
pub mod error;
pub mod interceptor;
pub mod register;
pub mod runner;
pub mod shutdown;
pub mod signals;
pub mod telemetry;
