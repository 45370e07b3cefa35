use std::sync::Arc;

use crate::models::analysis::{AnalysisParams, AnalysisResult};
use crate::models::container::EncodedContainer;
use crate::models::error::DispatchError;

/// Boundary to the remote analysis service.
///
/// Called from controller threads, possibly several at once in continuous
/// mode. Implementations must not retry on their own.
pub trait Dispatcher: Send + Sync {
    fn submit(&self, container: &EncodedContainer, params: &AnalysisParams) -> Result<AnalysisResult, DispatchError>;
}

impl<D: Dispatcher + ?Sized> Dispatcher for Arc<D> {
    fn submit(&self, container: &EncodedContainer, params: &AnalysisParams) -> Result<AnalysisResult, DispatchError> {
        (**self).submit(container, params)
    }
}

impl<D: Dispatcher + ?Sized> Dispatcher for Box<D> {
    fn submit(&self, container: &EncodedContainer, params: &AnalysisParams) -> Result<AnalysisResult, DispatchError> {
        (**self).submit(container, params)
    }
}
