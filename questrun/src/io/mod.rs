//! I/O for questrun: config, session layout, content files, run state, rendering.

pub mod config;
pub mod content_store;
pub mod init;
pub mod render;
pub mod run_state;
