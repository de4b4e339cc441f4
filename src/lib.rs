//! Markdown rendering with code blocks highlighted by a remote service.
//!
//! Code blocks are collected from a parsed document, sent to the highlighting
//! service in one batch, and matched back to their nodes by content identity
//! during a second, independent render pass.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;

mod util;
