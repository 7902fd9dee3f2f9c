// ABOUTME: Library crate for mcp-hub exposing the process pool and configuration for tests and embedding

#![allow(missing_docs)]

pub mod config;
pub mod mcp_pool;
