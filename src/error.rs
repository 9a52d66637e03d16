use thiserror::Error;

/// Failures of the upstream odds provider. None of these are fatal to a
/// refresh cycle; the orchestrator turns all of them into a fallback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider rate limited the request: {0}")]
    RateLimited(String),
    #[error("provider unreachable: {0}")]
    Unreachable(String),
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
    #[error("provider credentials missing ({0} not set)")]
    MissingCredentials(&'static str),
}

impl ProviderError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::RateLimited(_) => "rate_limited",
            ProviderError::Unreachable(_) => "unreachable",
            ProviderError::MalformedResponse(_) => "malformed_response",
            ProviderError::MissingCredentials(_) => "missing_credentials",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Unreachable(format!("request timed out: {err}"))
        } else if err.is_decode() {
            ProviderError::MalformedResponse(err.to_string())
        } else {
            ProviderError::Unreachable(err.to_string())
        }
    }
}

/// A fixture could not be given a model prediction because its stats inputs
/// are incomplete. The fixture is still enriched with placeholder values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no stats profile for {team} in fixture {fixture_id}")]
pub struct EnrichmentGap {
    pub fixture_id: String,
    pub team: String,
}
