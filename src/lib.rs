//! # classpath-index
//!
//! Scans a nested application archive once, persists per-observer indexes of
//! component declarations, and on later startups decides from feature-flag
//! configuration which of those components may load, without re-scanning.
//!
//! ## Architecture
//!
//! - **archive**: Outer archive access (packaged or exploded) and the module index
//! - **filter**: Which nested archives are worth walking
//! - **walker**: Single pass over nested archives with exclusive entry dispatch
//! - **observer**: Observer trait and the component, class-name and flag observers
//! - **index**: On-disk index caches, module markers and cache status
//! - **flags**: Feature-flag declarations and the declaration index
//! - **properties**: Layered configuration snapshot
//! - **resolver**: Flag resolution and the component filter
//! - **finder**: Reading observer caches back through a component filter
//! - **bootstrap**: Startup orchestration
//! - **declare**: Declaration manifest generation from Java sources via tree-sitter

pub mod archive;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod declare;
pub mod error;
pub mod filter;
pub mod finder;
pub mod flags;
pub mod index;
pub mod observer;
pub mod properties;
pub mod resolver;
pub mod walker;
