pub mod common;
pub mod bedrock;
pub mod local;

pub use common::{AiBackend, BackendKind};
pub use bedrock::BedrockAiBackend;
pub use local::LocalAiBackend;
