pub mod deadline;
pub mod settings;

pub use deadline::{Deadline, TimeoutError, TimeoutKind};
pub use settings::{BatchSettings, ClientSettings, TenancySettings};

pub mod telemetry;
