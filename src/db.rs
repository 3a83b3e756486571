//! SQLite connection setup.
//!
//! Sentra is a single-process CLI, so the pool stays small: one writer at a
//! time is the norm, and WAL keeps a concurrent `review` from blocking an
//! in-flight `answer` run. Foreign keys are enforced so answer rows cannot
//! outlive their questionnaire.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::config::Config;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    if let Some(parent) = config.db.path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(&config.db.path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig, IndexConfig};
    use std::path::PathBuf;

    fn config_at(path: PathBuf) -> Config {
        Config {
            db: DbConfig { path },
            index: IndexConfig {
                root: PathBuf::from("unused"),
            },
            chunking: Default::default(),
            retrieval: Default::default(),
            embedding: Default::default(),
            llm: Default::default(),
            confidence: Default::default(),
        }
    }

    #[tokio::test]
    async fn connect_creates_nested_database_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/dir/sentra.sqlite");
        let pool = connect(&config_at(path.clone())).await.unwrap();
        pool.close().await;
        assert!(path.exists());
    }
}
