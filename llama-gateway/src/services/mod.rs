pub mod bridge;
pub mod diagnostics;

pub use bridge::{BridgeError, GeneratedText, GenerationParams, InferenceBackend};
pub use diagnostics::GpuProbe;
