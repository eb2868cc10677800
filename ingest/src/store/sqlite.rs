use super::Store;
use crate::entity::usage_sample;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{PeerUsage, UsageMap};
use sea_orm::sea_query::OnConflict;
use sea_orm::*;
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS usage_samples (
        public_key TEXT NOT NULL,
        as_of_ms INTEGER NOT NULL,
        upload INTEGER NOT NULL,
        download INTEGER NOT NULL,
        PRIMARY KEY (public_key, as_of_ms)
    )
"#;

const LATEST_USAGE_SQL: &str = r#"
    SELECT s.public_key, s.upload, s.download
    FROM usage_samples s
    JOIN (
        SELECT public_key, MAX(as_of_ms) AS latest
        FROM usage_samples
        GROUP BY public_key
    ) l ON s.public_key = l.public_key AND s.as_of_ms = l.latest
"#;

#[derive(Debug, FromQueryResult)]
struct LatestUsage {
    public_key: String,
    upload: i64,
    download: i64,
}

pub struct SqliteStore {
    db: DatabaseConnection,
}

impl SqliteStore {
    #[instrument(skip(database_path))]
    pub async fn open<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let database_path = database_path.as_ref();

        if let Some(parent) = database_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path.display());
        let db = Database::connect(&database_url).await?;

        db.execute(Statement::from_string(
            db.get_database_backend(),
            CREATE_TABLE_SQL.to_string(),
        ))
        .await?;

        info!("Connected to SQLite database: {}", database_path.display());

        Ok(Self { db })
    }

    /// Every sample of one peer, oldest first.
    #[cfg(test)]
    #[instrument(skip(self))]
    pub async fn history(&self, public_key: &str) -> Result<Vec<(DateTime<Utc>, PeerUsage)>> {
        let rows = usage_sample::Entity::find()
            .filter(usage_sample::Column::PublicKey.eq(public_key))
            .order_by_asc(usage_sample::Column::AsOfMs)
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let as_of = DateTime::from_timestamp_millis(row.as_of_ms)?;
                let usage = PeerUsage::new(row.public_key, row.upload as u64, row.download as u64);
                Some((as_of, usage))
            })
            .collect())
    }
}

#[async_trait]
impl Store for SqliteStore {
    #[instrument(skip(self))]
    async fn load_baseline(&self) -> Result<UsageMap> {
        let rows = LatestUsage::find_by_statement(Statement::from_string(
            self.db.get_database_backend(),
            LATEST_USAGE_SQL.to_string(),
        ))
        .all(&self.db)
        .await?;

        debug!("Loaded baseline usage of {} peers", rows.len());
        Ok(rows
            .into_iter()
            .map(|row| {
                let usage =
                    PeerUsage::new(row.public_key.clone(), row.upload as u64, row.download as u64);
                (row.public_key, usage)
            })
            .collect())
    }

    #[instrument(skip(self, usage), fields(peers = usage.len()))]
    async fn write_usage(&self, usage: &[PeerUsage], as_of: DateTime<Utc>) -> Result<()> {
        if usage.is_empty() {
            return Ok(());
        }

        let as_of_ms = as_of.timestamp_millis();
        let models = usage.iter().map(|u| usage_sample::ActiveModel {
            public_key: Set(u.public_key.clone()),
            as_of_ms: Set(as_of_ms),
            upload: Set(u.upload as i64),
            download: Set(u.download as i64),
        });

        // Re-delivery of an already stored instant is a no-op.
        let inserted = usage_sample::Entity::insert_many(models)
            .on_conflict(
                OnConflict::columns([
                    usage_sample::Column::PublicKey,
                    usage_sample::Column::AsOfMs,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        debug!("Stored {} of {} usage samples", inserted, usage.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    async fn open_store() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("nested").join("usage.db"))
            .await
            .unwrap();
        (dir, store)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_empty_store_has_empty_baseline() {
        let (_dir, store) = open_store().await;
        assert!(store.load_baseline().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_baseline_is_latest_sample_per_peer() {
        let (_dir, store) = open_store().await;
        store
            .write_usage(
                &[PeerUsage::new("a", 10, 30), PeerUsage::new("b", 1, 2)],
                at(1_000),
            )
            .await
            .unwrap();
        store
            .write_usage(&[PeerUsage::new("a", 20, 60)], at(1_005))
            .await
            .unwrap();

        let baseline = store.load_baseline().await.unwrap();
        assert_eq!(baseline.len(), 2);
        assert_eq!(baseline["a"], PeerUsage::new("a", 20, 60));
        assert_eq!(baseline["b"], PeerUsage::new("b", 1, 2));
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let (_dir, store) = open_store().await;
        let usage = [PeerUsage::new("a", 10, 30)];
        store.write_usage(&usage, at(1_000)).await.unwrap();
        store.write_usage(&usage, at(1_000)).await.unwrap();

        let history = store.history("a").await.unwrap();
        assert_eq!(history, vec![(at(1_000), PeerUsage::new("a", 10, 30))]);
    }

    #[tokio::test]
    async fn test_history_is_ordered() {
        let (_dir, store) = open_store().await;
        store
            .write_usage(&[PeerUsage::new("a", 20, 60)], at(2_000))
            .await
            .unwrap();
        store
            .write_usage(&[PeerUsage::new("a", 10, 30)], at(1_000))
            .await
            .unwrap();

        let history = store.history("a").await.unwrap();
        assert_eq!(history[0].0, at(1_000));
        assert_eq!(history[1].1, PeerUsage::new("a", 20, 60));
        assert!(store.history("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_write_is_noop() {
        let (_dir, store) = open_store().await;
        store.write_usage(&[], at(1_000)).await.unwrap();
        assert!(store.load_baseline().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_keeps_samples() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("usage.db");
        {
            let store = SqliteStore::open(&path).await.unwrap();
            store
                .write_usage(&[PeerUsage::new("a", 7, 9)], at(1_000))
                .await
                .unwrap();
        }
        let store = SqliteStore::open(&path).await.unwrap();
        assert_eq!(
            store.load_baseline().await.unwrap()["a"],
            PeerUsage::new("a", 7, 9)
        );
    }
}
