pub mod error;
pub mod executor;
mod queue;
pub mod work;

pub use error::BatchError;
pub use executor::{BatchingExecutor, ExecutorState};
pub use work::{BatchFuture, BatchedWork, BatchedWorkProcessor};

pub use scout_common::BatchSettings;
