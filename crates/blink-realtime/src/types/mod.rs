pub mod frame;
pub mod heartbeat;

pub use frame::{Command, Frame};
pub use heartbeat::Heartbeat;
