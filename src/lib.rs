pub mod api;
pub mod config;
pub mod error;
pub mod feature;
pub mod fetch;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod queue;
pub mod server;
pub mod shutdown;
pub mod spec_source;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;
