use std::env;
use tracing::warn;

/// Default bound on simultaneous scoring oracle sessions during grade-all.
pub const DEFAULT_GRADING_CONCURRENCY: usize = 5;
/// Default hours after which a GRADING entry is considered abandoned.
pub const DEFAULT_GRADING_STALENESS_HOURS: i64 = 1;
/// Default number of candidates pulled per appointment.
pub const DEFAULT_CANDIDATE_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store_url: String,
    pub store_service_key: String,
    pub scoring_agent_url: String,
    pub ranking_agent_url: String,
    pub routes_api_url: String,
    pub routes_api_key: String,
    pub grading_concurrency: usize,
    pub grading_staleness_hours: i64,
    pub candidate_limit: usize,
    /// Offset of the clinic's wall clock from UTC, in hours. Drives the
    /// evening-hours preference rule.
    pub clinic_utc_offset_hours: i32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            store_url: env::var("STORE_URL").unwrap_or_else(|_| {
                warn!("STORE_URL not set, using empty value");
                String::new()
            }),
            store_service_key: env::var("STORE_SERVICE_KEY").unwrap_or_else(|_| {
                warn!("STORE_SERVICE_KEY not set, using empty value");
                String::new()
            }),
            scoring_agent_url: env::var("SCORING_AGENT_URL").unwrap_or_else(|_| {
                warn!("SCORING_AGENT_URL not set, using empty value");
                String::new()
            }),
            ranking_agent_url: env::var("RANKING_AGENT_URL").unwrap_or_else(|_| {
                warn!("RANKING_AGENT_URL not set, using empty value");
                String::new()
            }),
            routes_api_url: env::var("ROUTES_API_URL").unwrap_or_else(|_| {
                warn!("ROUTES_API_URL not set, using empty value");
                String::new()
            }),
            routes_api_key: env::var("ROUTES_API_KEY").unwrap_or_else(|_| {
                warn!("ROUTES_API_KEY not set, using empty value");
                String::new()
            }),
            grading_concurrency: parse_env("GRADING_CONCURRENCY", DEFAULT_GRADING_CONCURRENCY),
            grading_staleness_hours: parse_env(
                "GRADING_STALENESS_HOURS",
                DEFAULT_GRADING_STALENESS_HOURS,
            ),
            candidate_limit: parse_env("CANDIDATE_LIMIT", DEFAULT_CANDIDATE_LIMIT),
            clinic_utc_offset_hours: parse_env("CLINIC_UTC_OFFSET_HOURS", 0),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.store_url.is_empty() && !self.store_service_key.is_empty()
    }

    pub fn is_scoring_configured(&self) -> bool {
        !self.scoring_agent_url.is_empty()
    }

    pub fn is_ranking_configured(&self) -> bool {
        !self.ranking_agent_url.is_empty()
    }

    pub fn is_routing_configured(&self) -> bool {
        !self.routes_api_url.is_empty() && !self.routes_api_key.is_empty()
    }
}

fn parse_env<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}
