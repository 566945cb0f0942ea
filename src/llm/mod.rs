//! Provider-facing components: payload construction, response normalization,
//! the completion gateway, the prompt refiner and the Gemini stream client.

pub mod gateway;
pub mod gemini;
pub mod models;
pub mod normalize;
pub mod payload;
pub mod refiner;

pub use gateway::{Completer, GatewayEndpoint, LlmGateway};
pub use gemini::{CoCreateStreamClient, StreamTextDecoder};
pub use models::ModelSelection;
pub use normalize::{Normalized, normalize_completion};
pub use payload::{ChatMessage, ImageInput, build_messages};
pub use refiner::{PromptRefiner, RefineCredentials, local_refine};
