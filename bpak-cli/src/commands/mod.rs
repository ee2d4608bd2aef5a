//! Subcommand implementations, one module per `bpak` verb.

pub mod add;
pub mod compare;
pub mod create;
pub mod keys;
pub mod set;
pub mod show;
pub mod sign;
pub mod transport;
pub mod verify;
