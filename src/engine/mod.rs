pub mod bridge;
pub mod ubi;

pub use bridge::{BridgeConfig, EngineBridge};
pub use ubi::{EngineMove, LineBuffer, UbiCommand, UbiEvent};
