use sea_orm::DatabaseConnection;

pub async fn setup_test_db() -> DatabaseConnection {
    // In-memory SQLite; the single-connection pool keeps every query on the same database
    super::connection::setup_database("sqlite::memory:")
        .await
        .expect("Failed to set up test database")
}
