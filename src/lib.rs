#![doc = "Catchment generation, spatial join and metrics over feature layers"]
pub mod catchment;
pub mod config;
mod error;
pub mod extract;
pub mod filter;
pub mod geom;
pub mod join;
pub mod layer;
pub mod metrics;
pub mod network;
mod pipeline;
mod value;

#[doc(inline)]
pub use error::{CatchmentError, Result};

#[doc(inline)]
pub use value::Value;

#[doc(inline)]
pub use layer::{Attributes, Feature, FeatureLayer, GeometryKind};

#[doc(inline)]
pub use geom::Crs;

#[doc(inline)]
pub use config::PipelineConfig;

#[doc(inline)]
pub use pipeline::{Pipeline, PipelineOutput};

pub use roadgraph;
