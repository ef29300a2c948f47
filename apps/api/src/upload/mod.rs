pub mod client;
pub mod handlers;
pub mod orchestrator;
pub mod validation;
