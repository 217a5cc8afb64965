pub mod execution;
pub mod orchestrator;
pub mod request;
pub mod timeline;
