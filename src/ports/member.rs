use uuid::Uuid;

#[mockall::automock]
#[async_trait::async_trait]
pub trait MemberPort: Send + Sync {
    async fn get_member(&self, member_id: Uuid) -> Result<Member, Error>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub member_id: Uuid,
    pub association_id: Uuid,
    pub display_name: String,
    pub active_member: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Domain-level error when a member does not exist
    #[error("member {0} does not exist")]
    MemberDoesNotExist(Uuid),

    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
