//! # strata-core
//!
//! Strided n-dimensional arrays with NumPy-style broadcasting.
//!
//! This crate provides:
//! - [`Array`]: a strided view over shared, kind-tagged storage
//! - [`Shape`] / [`Layout`]: shape, strides, and offset of a view
//! - [`DType`]: element kinds (U8, I32, F32, F64)
//! - [`element_wise`]: broadcast alignment of operand shapes
//! - [`ops`]: unary, binary, reduction and lane operators over any layout
//! - [`EngineConfig`]: process-wide settings, overridable from the environment
// - Storage: dense buffers, or virtual ones mapping positions through an index table
// - loops: run-collapsed iteration plans and the Unit/Step/Generic accessors
// - every operator picks the cheapest loop the view allows, once per call

pub mod array;
pub mod broadcast;
pub mod config;
pub mod dtype;
pub mod error;
pub mod layout;
pub mod loops;
pub mod ops;
pub mod shape;
pub mod storage;

pub use array::Array;
pub use broadcast::{broadcast_shapes, element_wise, ElementWise};
pub use config::EngineConfig;
pub use dtype::{DType, WithDType};
pub use error::{Error, Result};
pub use layout::Layout;
pub use loops::{BinaryLoop, LoopKind, StrideLoop};
pub use ops::{BinaryOp, CmpOp, LaneOp, ReduceOp, UnaryOp};
pub use shape::Shape;
pub use storage::{Buffer, MappedBuffer, Storage};
