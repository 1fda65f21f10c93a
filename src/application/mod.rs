//! Application services: the render pipeline and the pieces it coordinates.

pub mod auth;
pub mod delivery;
pub mod error;
pub mod janitor;
pub mod notifier;
pub mod pipeline;
pub mod renderer;
