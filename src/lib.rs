pub mod clock;
pub mod command;
pub mod dedup;
pub mod goals;
pub mod grid;
pub mod llm;
pub mod pipeline;
pub mod recovery;
pub mod server;
pub mod session;

pub use command::{BoxId, Command, Response};
pub use llm::{LlmClient, LlmConfig};
pub use pipeline::{Pipeline, PipelineConfig, Request};
