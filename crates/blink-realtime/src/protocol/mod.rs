//! Protocol-level utilities for STOMP over WebSocket.

pub mod constants;
pub mod formatter;
pub mod headers;
pub mod parser;

pub use constants::*;
pub use formatter::*;
pub use headers::*;
pub use parser::*;
