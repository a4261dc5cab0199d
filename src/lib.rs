//! Live top-down view of the road users an intersection tracker reports.
//!
//! Messages arrive from a [`transport::Source`], are decoded by [`message`]
//! and reconciled into on-screen entities by [`reconciler::Reconciler`],
//! which tells a [`renderer::Renderer`] what to draw. [`session::Session`]
//! ties these together on one task.

pub mod appearance;
pub mod error;
pub mod message;
pub mod reconciler;
pub mod renderer;
pub mod session;
pub mod transport;
pub mod types;
