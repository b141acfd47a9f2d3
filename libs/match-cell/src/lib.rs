pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::MatchError;
pub use models::*;
pub use router::match_routes;
pub use services::assignment::AssignmentCoordinator;
pub use services::proximity::{ProximityAugmenter, RoutesApiClient, RoutingOracle};
pub use services::ranking::{AgentRankingClient, PreferenceRanker, RankingOracle};
pub use services::rejection::RejectionService;
pub use services::selector::CandidateSelector;
