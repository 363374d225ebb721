pub mod channel;
pub mod commands;

pub use channel::{CommandChannel, CommandOutput, LocalShellChannel, SshChannel};
