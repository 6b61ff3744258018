use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, Row};

use crate::{
    db::{
        helpers::{decode_headers, encode_headers, format_datetime, parse_datetime, to_u16},
        models::CachedAsset,
        Database,
    },
    worker::http::ResponseType,
};

fn row_to_asset(row: &Row) -> Result<CachedAsset> {
    let status: i64 = row.get("status")?;
    let response_type: String = row.get("response_type")?;
    let headers: String = row.get("headers")?;
    let cached_at: String = row.get("cached_at")?;

    Ok(CachedAsset {
        cache_name: row.get("cache_name")?,
        request_key: row.get("request_key")?,
        url: row.get("url")?,
        status: to_u16(status, "status")?,
        status_text: row.get("status_text")?,
        response_type: ResponseType::parse(&response_type)
            .ok_or_else(|| anyhow!("unknown response type {response_type}"))?,
        headers: decode_headers(&headers)?,
        body: row.get("body")?,
        cached_at: parse_datetime(&cached_at, "cached_at")?,
    })
}

fn ensure_generation(conn: &Connection, cache_name: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO cache_generations (name, created_at) VALUES (?1, ?2)",
        params![cache_name, format_datetime(&Utc::now())],
    )
    .with_context(|| format!("failed to open cache {cache_name}"))?;
    Ok(())
}

fn upsert_entry(conn: &Connection, asset: &CachedAsset) -> Result<()> {
    conn.execute(
        "INSERT INTO cache_entries
            (cache_name, request_key, url, status, status_text, response_type, headers, body, cached_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(cache_name, request_key) DO UPDATE SET
            url = excluded.url,
            status = excluded.status,
            status_text = excluded.status_text,
            response_type = excluded.response_type,
            headers = excluded.headers,
            body = excluded.body,
            cached_at = excluded.cached_at",
        params![
            asset.cache_name,
            asset.request_key,
            asset.url,
            i64::from(asset.status),
            asset.status_text,
            asset.response_type.as_str(),
            encode_headers(&asset.headers)?,
            asset.body,
            format_datetime(&asset.cached_at),
        ],
    )
    .with_context(|| format!("failed to store {} in {}", asset.request_key, asset.cache_name))?;
    Ok(())
}

impl Database {
    pub async fn cache_names(&self) -> Result<Vec<String>> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT name FROM cache_generations ORDER BY created_at ASC")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(names)
        })
        .await
    }

    /// Drops a generation and, through the cascade, every entry in it.
    pub async fn delete_cache(&self, cache_name: &str) -> Result<bool> {
        let cache_name = cache_name.to_string();
        self.execute(move |conn| {
            let rows_affected = conn
                .execute(
                    "DELETE FROM cache_generations WHERE name = ?1",
                    params![cache_name],
                )
                .with_context(|| format!("failed to delete cache {cache_name}"))?;
            Ok(rows_affected > 0)
        })
        .await
    }

    pub async fn put_cache_entry(&self, asset: &CachedAsset) -> Result<()> {
        let record = asset.clone();
        self.execute(move |conn| {
            ensure_generation(conn, &record.cache_name)?;
            upsert_entry(conn, &record)
        })
        .await
    }

    /// Stores a whole batch or nothing. The generation row is created in the
    /// same transaction, so a failed batch leaves no trace of the cache either.
    pub async fn put_cache_entries(&self, cache_name: &str, assets: Vec<CachedAsset>) -> Result<()> {
        let cache_name = cache_name.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            ensure_generation(&tx, &cache_name)?;
            for asset in &assets {
                upsert_entry(&tx, asset)?;
            }
            tx.commit()
                .with_context(|| format!("failed to commit batch into {cache_name}"))?;
            Ok(())
        })
        .await
    }

    /// Exact-key lookup across generations, preferring `preferred_cache` and
    /// then the most recently stored copy.
    pub async fn match_cache_entry(
        &self,
        preferred_cache: &str,
        request_key: &str,
    ) -> Result<Option<CachedAsset>> {
        let preferred_cache = preferred_cache.to_string();
        let request_key = request_key.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT cache_name, request_key, url, status, status_text, response_type, headers, body, cached_at
                 FROM cache_entries
                 WHERE request_key = ?1
                 ORDER BY (cache_name = ?2) DESC, cached_at DESC
                 LIMIT 1",
            )?;

            let mut rows = stmt.query(params![request_key, preferred_cache])?;
            let asset = match rows.next()? {
                Some(row) => Some(row_to_asset(row)?),
                None => None,
            };
            Ok(asset)
        })
        .await
    }

    pub async fn count_cache_entries(&self, cache_name: &str) -> Result<u64> {
        let cache_name = cache_name.to_string();
        self.execute(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM cache_entries WHERE cache_name = ?1",
                params![cache_name],
                |row| row.get(0),
            )?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::http::{Request, Response};

    fn asset(cache_name: &str, url: &str, body: &str) -> CachedAsset {
        let request = Request::get(url);
        let response = Response::new(200)
            .with_header("Content-Type", "text/css")
            .with_body(body);
        CachedAsset::capture(cache_name, &request, &response)
    }

    #[tokio::test]
    async fn test_put_and_match_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let stored = asset("diggo-ocr-v1", "https://diggo.test/styles.css", "body{}");
        db.put_cache_entry(&stored).await.unwrap();

        let found = db
            .match_cache_entry("diggo-ocr-v1", &stored.request_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.body, b"body{}".to_vec());
        assert_eq!(found.headers.get("content-type").map(String::as_str), Some("text/css"));
        assert_eq!(db.cache_names().await.unwrap(), vec!["diggo-ocr-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_put_overwrites_same_key() {
        let db = Database::open_in_memory().unwrap();
        db.put_cache_entry(&asset("v1", "https://diggo.test/app.js", "old"))
            .await
            .unwrap();
        db.put_cache_entry(&asset("v1", "https://diggo.test/app.js", "new"))
            .await
            .unwrap();

        assert_eq!(db.count_cache_entries("v1").await.unwrap(), 1);
        let found = db
            .match_cache_entry("v1", "GET:https://diggo.test/app.js")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.body, b"new".to_vec());
    }

    #[tokio::test]
    async fn test_match_prefers_requested_generation() {
        let db = Database::open_in_memory().unwrap();
        db.put_cache_entry(&asset("v1", "https://diggo.test/", "current"))
            .await
            .unwrap();
        db.put_cache_entry(&asset("v0", "https://diggo.test/", "stale"))
            .await
            .unwrap();

        let found = db
            .match_cache_entry("v1", "GET:https://diggo.test/")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.cache_name, "v1");

        let fallback = db
            .match_cache_entry("v2", "GET:https://diggo.test/")
            .await
            .unwrap();
        assert!(fallback.is_some());
    }

    #[tokio::test]
    async fn test_fallback_match_returns_newest_copy() {
        let db = Database::open_in_memory().unwrap();
        let base = chrono::DateTime::parse_from_rfc3339("2025-03-15T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let mut newer = asset("v1", "https://diggo.test/", "newer");
        newer.cached_at = base + chrono::Duration::milliseconds(500);
        let mut older = asset("v0", "https://diggo.test/", "older");
        older.cached_at = base + chrono::Duration::nanoseconds(400_000_001);
        db.put_cache_entry(&newer).await.unwrap();
        db.put_cache_entry(&older).await.unwrap();

        let found = db
            .match_cache_entry("v2", "GET:https://diggo.test/")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.body, b"newer".to_vec());
        assert_eq!(found.cached_at, newer.cached_at);
    }

    #[tokio::test]
    async fn test_delete_cache_cascades() {
        let db = Database::open_in_memory().unwrap();
        db.put_cache_entries(
            "v0",
            vec![
                asset("v0", "https://diggo.test/a", "a"),
                asset("v0", "https://diggo.test/b", "b"),
            ],
        )
        .await
        .unwrap();
        assert_eq!(db.count_cache_entries("v0").await.unwrap(), 2);

        assert!(db.delete_cache("v0").await.unwrap());
        assert_eq!(db.count_cache_entries("v0").await.unwrap(), 0);
        assert!(db.cache_names().await.unwrap().is_empty());
        assert!(!db.delete_cache("v0").await.unwrap());
    }
}
