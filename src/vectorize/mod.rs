//! Vectorized scalar kernels
//!
//! Pure elementwise transforms over columns. A null input slot yields a
//! null output slot at the same position; a constant input is computed
//! once and stays constant.

mod column;
pub mod timestamp;
pub mod trig;

pub use column::{Column, Nulls};
