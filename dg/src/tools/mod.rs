//! Tool-dispatch boundary
//!
//! The eleven numbered operations plus the feedback tool, each behind the
//! [`Tool`] trait, dispatched through [`ToolRouter`].

pub mod builtin;
pub mod router;
pub mod traits;

pub use router::ToolRouter;
pub use traits::Tool;
