//! Relay CLI library: the command implementations behind the `relay` binary.

pub mod commands;
