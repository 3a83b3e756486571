use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the schema on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS questionnaires (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            filename TEXT NOT NULL,
            uploaded_at INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'uploaded'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS answers (
            id TEXT PRIMARY KEY,
            questionnaire_id TEXT NOT NULL,
            question_number INTEGER NOT NULL,
            question_text TEXT NOT NULL,
            generated_answer TEXT NOT NULL,
            edited_answer TEXT,
            citation TEXT NOT NULL DEFAULT '',
            confidence REAL NOT NULL DEFAULT 0,
            snippet TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL,
            UNIQUE(questionnaire_id, question_number),
            FOREIGN KEY (questionnaire_id) REFERENCES questionnaires(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_answers_questionnaire_id ON answers(questionnaire_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_questionnaires_user_id ON questionnaires(user_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
