//! Shared test utilities for aims-db unit tests.

#[cfg(test)]
pub(crate) mod helpers {
    use crate::AimsDb;
    use crate::service::AimsService;
    use crate::trail::writer::TrailWriter;

    /// In-memory service with the trail disabled.
    pub async fn test_service() -> AimsService {
        let db = AimsDb::open_local(":memory:").await.unwrap();
        AimsService::from_db(db, TrailWriter::disabled())
    }

    /// In-memory service writing its trail to `trail_dir`.
    pub async fn test_service_with_trail(trail_dir: std::path::PathBuf) -> AimsService {
        let db = AimsDb::open_local(":memory:").await.unwrap();
        AimsService::from_db(db, TrailWriter::new(trail_dir).unwrap())
    }
}
