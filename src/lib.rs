pub mod app;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod enumerator;
pub mod output;
pub mod probe;
pub mod runner;
pub mod stats;

#[cfg(test)]
mod tests;
