pub mod prompts;
pub mod runner;
pub mod scrubber;
pub mod transcript;

pub use runner::{AgentRunner, RunOutcome};
