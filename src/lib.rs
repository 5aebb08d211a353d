pub mod api;
pub mod app;
pub mod config;
pub mod state;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;
