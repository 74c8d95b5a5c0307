mod classifier_cell;
mod page;
mod routes;
mod server;
#[cfg(test)]
mod test_support;

pub mod app;
pub mod config;
pub mod telemetry;

pub use app::start_app;
