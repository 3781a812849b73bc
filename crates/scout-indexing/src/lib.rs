pub mod error;
pub mod event;
pub mod http;
pub mod memory;
pub mod plan;
pub mod processor;
pub mod queue;
pub mod session;
pub mod work;

pub use error::IndexingError;
pub use event::{EventKind, IndexingEvent};
pub use http::{HttpIndexSession, HttpSessionFactory};
pub use memory::{MemoryIndex, MemoryIndexSession, MemorySessionFactory};
pub use plan::{IndexingPlan, PlanEntry, PlanReport};
pub use processor::IndexingQueueProcessor;
pub use queue::IndexingQueue;
pub use session::{IndexSession, SessionFactory};
pub use work::{IndexingHandle, IndexingWork};
