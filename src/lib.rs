//! preguiça — a lazy tensor engine with reverse-mode automatic
//! differentiation.
//!
//! Building [`Array`] expressions records a DAG of primitive ops; nothing
//! executes until an explicit evaluation (`eval`, `item`, `to_raw`,
//! `backward`) realizes the graph into packed buffers. Shape manipulations
//! (permute, slice, reshape of contiguous data, broadcast) are pure
//! `(shape, strides, offset)` view changes and never copy.
//!
//! # Thread safety
//!
//! The engine is single-threaded by design: nodes and storage are
//! `Rc`-based, so `Array` is neither `Send` nor `Sync`. The only
//! process-wide state is the random stream ([`seed_rng`]) and the memory
//! profiler, both mutex-guarded; threads operating on disjoint graphs are
//! safe exactly as far as they keep to their own arrays.

pub mod array;
pub mod backend;
pub mod dtype;
pub mod errors;
mod graph;
pub mod nn;
pub mod op;
pub mod optim;
pub mod profiler;
mod rng;
pub mod storage;
pub mod types;
pub mod view;

pub use array::Array;
pub use dtype::DType;
pub use errors::{PgError, PgResult};
pub use profiler::{
    disable_memory_profile, enable_memory_profile, memory_profile, save_memory_profile,
    MemoryProfile,
};
pub use rng::seed_rng;
pub use storage::Buffer;
pub use types::{ArrayId, Scalar};
pub use view::{SliceSpec, View};
