//! Exposure stack validation.

use crate::core::filter::all_similar;
use crate::core::image::Image;
use std::fmt;

/// Smallest stack that can be fused.
pub const MIN_STACK_SIZE: usize = 2;

/// Outcome of checking an exposure stack before fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackStatus {
    /// Enough images, all of the same shape.
    Ready,
    /// Fewer than [`MIN_STACK_SIZE`] images.
    TooSmall(usize),
    /// Images differ in width, height, channels or frames.
    Inconsistent,
}

impl StackStatus {
    /// Check `stack`.
    pub fn of(stack: &[&Image]) -> Self {
        if stack.len() < MIN_STACK_SIZE {
            StackStatus::TooSmall(stack.len())
        } else if !all_similar(stack) {
            StackStatus::Inconsistent
        } else {
            StackStatus::Ready
        }
    }

    /// Whether the stack can be fused.
    pub fn is_ready(&self) -> bool {
        matches!(self, StackStatus::Ready)
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackStatus::Ready => write!(f, "ready"),
            StackStatus::TooSmall(n) => {
                write!(f, "{} exposure(s), at least {} required", n, MIN_STACK_SIZE)
            }
            StackStatus::Inconsistent => write!(f, "exposures differ in shape"),
        }
    }
}
