pub mod board;
pub mod clock;
pub mod oracle;
pub mod session;
