use sqlx::{Executor, PgPool};

// Embedded at compile time; every statement is idempotent
const MIG_0001: &str = include_str!("../migrations/0001_create_presentations.sql");
const MIG_0002: &str = include_str!("../migrations/0002_create_interactions.sql");
const MIG_0003: &str = include_str!("../migrations/0003_create_user_preferences.sql");
const MIG_0004: &str = include_str!("../migrations/0004_create_embeddings_and_neighbors.sql");

pub async fn run_all(db: &PgPool) -> Result<(), sqlx::Error> {
    for (i, sql) in [MIG_0001, MIG_0002, MIG_0003, MIG_0004].into_iter().enumerate() {
        // No bind arguments: sent as a simple query so multi-statement files work
        db.execute(sql).await?;
        tracing::info!(migration = i + 1, "homefeed-service migration applied");
    }
    Ok(())
}
