use std::sync::Arc;

use async_trait::async_trait;

use super::{error::RenderError, types::RenderRequest, types::RenderResult};

/// A server-side renderer the middleware can delegate page requests to.
///
/// Implementations must tolerate concurrent `visit` calls. Anything that
/// swaps the application underneath (a reload) is the implementation's
/// business.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn visit(&self, request: RenderRequest) -> Result<RenderResult, RenderError>;
}

#[async_trait]
impl<E> RenderEngine for Arc<E>
where
    E: RenderEngine + ?Sized,
{
    async fn visit(&self, request: RenderRequest) -> Result<RenderResult, RenderError> {
        (**self).visit(request).await
    }
}
