pub(crate) mod http_errors;
pub mod openrouter;

pub use openrouter::OpenRouterClient;
