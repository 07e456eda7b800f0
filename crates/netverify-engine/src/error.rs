use netverify_config::ConfigError;
use thiserror::Error;

/// Errors raised while building or solving an encoding.
///
/// Every variant is fatal for the query that raised it: a verification
/// result is only meaningful when every construct was modeled.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("unsupported feature on {router} interface {interface} ({direction}): {detail}")]
    Unsupported {
        router: String,
        interface: String,
        direction: String,
        detail: String,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("router {router} has a static route for {network} with no resolvable next hop")]
    UnresolvedStaticRoute { router: String, network: String },
    #[error("solver returned unknown: {0}")]
    SolverUnknown(String),
    #[error("solver error: {0}")]
    Solver(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EncodeError {
    pub(crate) fn unsupported(
        router: &str,
        interface: &str,
        direction: &str,
        detail: impl Into<String>,
    ) -> Self {
        EncodeError::Unsupported {
            router: router.to_string(),
            interface: interface.to_string(),
            direction: direction.to_string(),
            detail: detail.into(),
        }
    }
}

pub type EncodeResult<T> = Result<T, EncodeError>;
