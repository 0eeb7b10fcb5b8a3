//! Error types for the positioning engine and its front ends

use thiserror::Error;

use crate::utils::config::ConfigError;

/// Reasons the iterative path-loss solver gives up.
///
/// Never surfaced to `estimate` callers: any of these routes the access
/// point to the weighted-centroid fallback.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("at least {required} distinct points required, got {available}")]
    InsufficientPoints { available: usize, required: usize },

    #[error("parameters became non-finite at iteration {iteration}")]
    NonFiniteParameters { iteration: usize },

    #[error("parameters ran away at iteration {iteration}: n={exponent:.3}, A={attenuation:.3}")]
    ParameterRunaway {
        iteration: usize,
        exponent: f64,
        attenuation: f64,
    },

    #[error("path-loss exponent {0:.3} outside the accepted range")]
    ExponentOutOfRange(f64),

    #[error("reference attenuation {0:.3} dB outside the accepted range")]
    AttenuationOutOfRange(f64),

    #[error("geometry too weak: HDOP {hdop:.3}")]
    PoorGeometry { hdop: f64 },

    #[error("solved position has no finite uncertainty radius")]
    NonFiniteEstimate,
}

/// Top-level error for batch input handling and the command line tool
#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type LocatorResult<T> = Result<T, LocatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_error_messages() {
        let err = SolverError::PoorGeometry { hdop: 7.25 };
        assert_eq!(err.to_string(), "geometry too weak: HDOP 7.250");

        let err = SolverError::ParameterRunaway { iteration: 4, exponent: 11.0, attenuation: 40.0 };
        assert!(err.to_string().contains("iteration 4"));
    }

    #[test]
    fn test_locator_error_from_json() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: LocatorError = json_err.into();
        assert!(matches!(err, LocatorError::Json(_)));
        assert!(err.to_string().starts_with("JSON error"));
    }
}
