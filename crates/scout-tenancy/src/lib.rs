pub mod error;
pub mod strategy;

pub use error::TenancyError;
pub use strategy::{parse_strategy, DiscriminatorMultiTenancy, MultiTenancyStrategy, NoMultiTenancy};
