pub mod config;
pub mod integrations;
pub mod llm;
pub mod orchestrator;
pub mod persona;
pub mod queue;
pub mod terminal;
pub mod tools;
pub mod transcript;
