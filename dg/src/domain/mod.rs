//! Core domain types
//!
//! Persisted enums ([`TaskStatus`], [`JobState`]) live in the store crate;
//! this module adds the request-side types: target descriptors, priorities,
//! and public id generation.

pub mod id;
pub mod priority;
pub mod target;

pub use dredgestore::{JobState, TaskStatus};
pub use id::public_id;
pub use priority::Priority;
pub use target::Target;
