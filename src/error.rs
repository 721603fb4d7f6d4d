use thiserror::Error;

/// Every way a pipeline stage can fail.
///
/// Apart from `Aggregation`, these are degradations: the caller logs them and
/// skips the affected layer, feature or join pair.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatchmentError {
    /// Missing or invalid buffer, join or metrics configuration for a named layer.
    #[error("configuration error for '{layer}': {reason}")]
    Configuration { layer: String, reason: String },

    /// Unsupported geometry kind for the requested strategy, or an unrepairable geometry.
    #[error("geometry error in '{layer}' (feature {feature:?}): {reason}")]
    Geometry { layer: String, feature: Option<usize>, reason: String },

    /// Routing graph construction failed or produced nothing routable.
    #[error("network build error for '{layer}': {reason}")]
    NetworkBuild { layer: String, reason: String },

    /// A single catchment-layer x candidate-layer join failed.
    #[error("join error between '{buffer_layer}' and '{join_layer}': {reason}")]
    Join { buffer_layer: String, join_layer: String, reason: String },

    /// A group-by key column is absent from the fused table.
    #[error("aggregation error: {0}")]
    Aggregation(String),

    /// A coordinate transform could not be built or applied.
    #[error("projection error: {0}")]
    Projection(String),
}

pub type Result<T, E = CatchmentError> = std::result::Result<T, E>;

impl CatchmentError {
    pub(crate) fn config(layer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration { layer: layer.into(), reason: reason.into() }
    }

    pub(crate) fn geometry(layer: impl Into<String>, feature: Option<usize>, reason: impl Into<String>) -> Self {
        Self::Geometry { layer: layer.into(), feature, reason: reason.into() }
    }

    pub(crate) fn network(layer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NetworkBuild { layer: layer.into(), reason: reason.into() }
    }
}

impl From<polars::prelude::PolarsError> for CatchmentError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        CatchmentError::Aggregation(e.to_string())
    }
}
