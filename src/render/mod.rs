//! The rendering side of the bridge: what an engine receives, what it hands
//! back, and the dist-directory engine used when no other engine is supplied.

mod dist;
mod engine;
mod error;
mod types;

pub use dist::{DistEngine, EngineError, EngineOptions};
pub use engine::RenderEngine;
pub use error::{RenderError, RenderFailure, TRANSITION_ABORTED_TAG, UNRECOGNIZED_URL_TAG};
pub use types::{BodyError, BodyStream, RenderBody, RenderContext, RenderRequest, RenderResult};
