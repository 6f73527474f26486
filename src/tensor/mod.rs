//! Shaped buffers
//!
//! The dispatch layer borrows [`Tensor`] views: reference-counted device
//! [`Storage`] plus a [`Layout`] describing shape, strides, and offset.
//! Matrix operands are rank 2 (`[rows, cols]`), batch operands rank 3
//! (`[batch, rows, cols]`).

mod core;
mod layout;
mod storage;

pub use core::Tensor;
pub use layout::{Layout, Shape, Strides};
pub use storage::Storage;
