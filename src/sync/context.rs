use uuid::Uuid;

/// Explicit per-run context threaded through the runner, resolver and
/// upserter. Nothing here is ambient or shared between runs; two ingestions
/// running concurrently each own their context and their branch-scoped
/// connection.
pub struct SyncScope {
    /// Ingestion this run belongs to.
    pub ingestion_id: Uuid,
    /// Branch the writes are staged in.
    pub branch_id: Uuid,
    /// User the change journal attributes writes to.
    pub user: Option<String>,
    /// Tag set propagated onto every synced entity.
    pub tags: Vec<String>,
}

impl SyncScope {
    #[must_use]
    pub fn new(
        ingestion_id: Uuid,
        branch_id: Uuid,
        user: Option<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            ingestion_id,
            branch_id,
            user,
            tags,
        }
    }
}
