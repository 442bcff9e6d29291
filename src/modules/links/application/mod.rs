pub mod link_orchestrator;

pub use link_orchestrator::{LinkOrchestrator, LinkRequest, ResolutionHandle};
