use std::future::Future;
use std::pin::Pin;

use crate::error::RequestError;
use crate::model::{ChatMessage, GenerationParams};

/// Everything one chat-completion call needs.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub messages: &'a [ChatMessage],
    pub params: &'a GenerationParams,
}

pub type ModelFuture<'a> = Pin<Box<dyn Future<Output = Result<ChatMessage, RequestError>> + 'a>>;

/// Produces exactly one assistant message for an ordered history, or fails.
///
/// Implementations make at most one outbound call per `complete` and do
/// not retry.
pub trait ModelClient {
    fn complete<'a>(&'a self, request: ModelRequest<'a>) -> ModelFuture<'a>;
}
