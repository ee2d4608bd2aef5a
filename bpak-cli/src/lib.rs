//! Library entry for `bpak-cli`, used by integration tests and embedding.

pub mod commands;
