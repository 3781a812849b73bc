pub mod error;
pub mod executor;
mod log;
pub mod request;
pub mod response;
pub mod stats;
pub mod timer;
pub mod transport;

pub use error::{ClientError, TransportError};
pub use executor::{AsyncRequestExecutor, PendingResponse};
pub use request::{Method, Request, RequestBuilder};
pub use response::{RawResponse, Response};
pub use stats::{ExecutorStats, StatsSnapshot};
pub use timer::{TimeoutScheduler, TimerHandle, TokioTimeoutScheduler};
pub use transport::{Entity, ReqwestTransport, Transport, TransportRequest};

pub use scout_common::{Deadline, TimeoutError, TimeoutKind};
