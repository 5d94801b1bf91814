pub mod app_state;
pub mod messages;
pub mod seat;

// Re-export important types
pub use messages::*;
pub use seat::*;
