pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::WaitlistError;
pub use models::*;
pub use router::waitlist_routes;
pub use services::grading::GradingOrchestrator;
pub use services::scoring::{AgentScoringClient, ScoringOracle};
pub use services::waitlist::WaitlistService;
