// Public API - only expose the runner module
pub mod runner;

// Internal modules - organized by subsystem
mod config;
mod coordination;
mod discovery;
mod formats;
mod io;
mod sink;
mod telemetry;
