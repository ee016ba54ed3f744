//! Parallel ghost-zone evaluation of radius-1 stencils on a 1-D torus.

pub mod error;
pub mod reference;
pub mod rules;
pub mod torus;
pub use error::{Result, StencilError};
pub use torus::{RunConfig, ToroidalField};
