//! Tone mapping: collapsing exposure stacks and HDR images to LDR.
//!
//! - [`raman`]: bilateral exposure fusion operator
//! - [`exposures`]: synthetic exposure stacks from one HDR image
//! - [`stack`]: exposure stack validation

pub mod exposures;
pub mod raman;
pub mod stack;

pub use exposures::{ExposureGenerator, StopBracketing};
pub use raman::{RamanConfig, RamanTmo};
pub use stack::{StackStatus, MIN_STACK_SIZE};
