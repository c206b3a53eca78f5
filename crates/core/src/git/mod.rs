//! Repository client capability: a thin `git2` wrapper plus the per-path
//! client registry.

pub mod client;
pub mod registry;

pub use client::{Credentials, GitClient};
pub use registry::ClientRegistry;
