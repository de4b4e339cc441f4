//! Application services: block bookkeeping, snippets, highlighting, rendering.

pub mod error;
pub mod highlight;
pub mod render;
pub mod snippets;
