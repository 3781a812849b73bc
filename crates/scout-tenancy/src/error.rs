#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TenancyError {
    #[error("tenant id '{tenant_id}' given for {context} but multi-tenancy is disabled")]
    TenantIdNotExpected { tenant_id: String, context: String },
    #[error("no tenant id given for {context} but multi-tenancy is enabled")]
    TenantIdRequired { context: String },
    #[error("unknown multi-tenancy strategy '{0}', available: none, discriminator")]
    UnknownStrategy(String),
}
