pub mod command;
pub mod constants;
pub mod error;
pub mod frame;

pub use command::{Address, Command, CommandError, PutTarget, Response};
pub use constants::*;
pub use error::ProtocolError;
