//! SQLite-backed record store.
//!
//! # Responsibilities
//! - Own a single connection for the process lifetime
//! - Create and migrate the `requests` table
//! - Run every statement on the blocking pool
//!
//! # Design Decisions
//! - Schema versioned through `PRAGMA user_version`
//! - Timestamps stored as integer microseconds so ordering is numeric
//! - Sub-documents stored as nullable TEXT, body as BLOB

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use chrono::DateTime;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};

use crate::record::{Document, Record, RecordSummary, StoredRecord, TlsMetadata};
use crate::store::{Page, RecordStore, StoreError};

const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS requests (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  method TEXT NOT NULL,
  scheme TEXT NOT NULL,
  protocol TEXT NOT NULL,
  proto_major INTEGER NOT NULL,
  proto_minor INTEGER NOT NULL,
  url TEXT NOT NULL,
  request_uri TEXT NOT NULL,
  host TEXT NOT NULL,
  path TEXT NOT NULL,
  query TEXT NOT NULL,
  fragment TEXT NOT NULL,
  remote_addr TEXT NOT NULL,
  ip TEXT NOT NULL,
  port TEXT NOT NULL,
  headers TEXT,
  cookies TEXT,
  trailers TEXT,
  transfer_encoding TEXT,
  body BLOB NOT NULL,
  body_size INTEGER NOT NULL,
  content_type TEXT NOT NULL,
  content_length INTEGER NOT NULL,
  form TEXT,
  post_form TEXT,
  multipart_form TEXT,
  user_agent TEXT NOT NULL,
  referer TEXT NOT NULL,
  tls_enabled INTEGER NOT NULL,
  tls_version TEXT NOT NULL,
  tls_cipher TEXT NOT NULL,
  tls_server_name TEXT NOT NULL,
  received_at_us INTEGER NOT NULL,
  correlation_id TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS requests_method_idx ON requests(method);
CREATE INDEX IF NOT EXISTS requests_host_idx ON requests(host);
CREATE INDEX IF NOT EXISTS requests_path_idx ON requests(path);
CREATE INDEX IF NOT EXISTS requests_ip_idx ON requests(ip);
CREATE INDEX IF NOT EXISTS requests_body_size_idx ON requests(body_size);
CREATE INDEX IF NOT EXISTS requests_content_type_idx ON requests(content_type);
CREATE INDEX IF NOT EXISTS requests_user_agent_idx ON requests(user_agent);
CREATE INDEX IF NOT EXISTS requests_tls_enabled_idx ON requests(tls_enabled);
CREATE INDEX IF NOT EXISTS requests_received_at_idx ON requests(received_at_us);
CREATE INDEX IF NOT EXISTS requests_correlation_id_idx ON requests(correlation_id);
"#;

const RECORD_COLUMNS: &str = r#"
  id, method, scheme, protocol, proto_major, proto_minor, url, request_uri,
  host, path, query, fragment, remote_addr, ip, port,
  headers, cookies, trailers, transfer_encoding,
  body, content_type, content_length,
  form, post_form, multipart_form,
  user_agent, referer,
  tls_enabled, tls_version, tls_cipher, tls_server_name,
  received_at_us, correlation_id
"#;

/// Record store on a single SQLite database file.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`. `:memory:` is accepted.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let in_memory = path.as_os_str() == ":memory:";
        if !in_memory {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }

        let mut conn = open_connection(&path, in_memory)?;
        migrate(&mut conn)?;

        tracing::info!(path = %path.display(), "Record store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Location of the database.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the underlying connection, flushing pending state.
    pub fn close(self) -> Result<(), StoreError> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| StoreError::InUse)?
            .into_inner()
            .map_err(|_| StoreError::Poisoned)?;
        conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
        tracing::info!(path = %self.path.display(), "Record store closed");
        Ok(())
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await?
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn create(&self, record: Record) -> Result<i64, StoreError> {
        self.with_conn(move |conn| insert_record(conn, &record)).await
    }

    async fn list(&self, page: Page) -> Result<Vec<RecordSummary>, StoreError> {
        let limit = i64::from(page.limit);
        let offset = i64::try_from(page.offset).unwrap_or(i64::MAX);
        self.with_conn(move |conn| list_records(conn, limit, offset)).await
    }

    async fn get(&self, correlation_id: &str) -> Result<Option<StoredRecord>, StoreError> {
        let correlation_id = correlation_id.to_owned();
        self.with_conn(move |conn| get_record(conn, &correlation_id)).await
    }
}

fn open_connection(path: &Path, in_memory: bool) -> Result<Connection, StoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)?;

    if !in_memory {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
    }
    conn.busy_timeout(Duration::from_secs(5))?;

    Ok(conn)
}

fn migrate(conn: &mut Connection) -> Result<(), StoreError> {
    let user_version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;

    match user_version {
        0 => {
            conn.execute_batch(SCHEMA)?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            Ok(())
        }
        SCHEMA_VERSION => Ok(()),
        found => Err(StoreError::Schema {
            found,
            expected: SCHEMA_VERSION,
        }),
    }
}

fn insert_record(conn: &Connection, record: &Record) -> Result<i64, StoreError> {
    let doc = |d: &Option<Document>| d.as_ref().map(|d| d.as_str().to_owned());

    conn.execute(
        r#"
        INSERT INTO requests (
          method, scheme, protocol, proto_major, proto_minor, url, request_uri,
          host, path, query, fragment, remote_addr, ip, port,
          headers, cookies, trailers, transfer_encoding,
          body, body_size, content_type, content_length,
          form, post_form, multipart_form,
          user_agent, referer,
          tls_enabled, tls_version, tls_cipher, tls_server_name,
          received_at_us, correlation_id
        ) VALUES (
          ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
          ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32, ?33
        )
        "#,
        params![
            record.method,
            record.scheme,
            record.protocol,
            record.proto_major,
            record.proto_minor,
            record.url,
            record.request_uri,
            record.host,
            record.path,
            record.query,
            record.fragment,
            record.remote_addr,
            record.ip,
            record.port,
            doc(&record.headers),
            doc(&record.cookies),
            doc(&record.trailers),
            doc(&record.transfer_encoding),
            record.body.as_ref(),
            record.body_size(),
            record.content_type,
            record.content_length,
            doc(&record.form),
            doc(&record.post_form),
            doc(&record.multipart_form),
            record.user_agent,
            record.referer,
            record.tls.enabled,
            record.tls.version,
            record.tls.cipher,
            record.tls.server_name,
            record.received_at.timestamp_micros(),
            record.correlation_id,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

fn list_records(conn: &Connection, limit: i64, offset: i64) -> Result<Vec<RecordSummary>, StoreError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT
          correlation_id, method, host, path, query, ip,
          content_type, body_size, tls_enabled, received_at_us
        FROM requests
        WHERE correlation_id <> ''
        ORDER BY received_at_us DESC, id DESC
        LIMIT ?1 OFFSET ?2
        "#,
    )?;

    let rows = stmt.query_map(params![limit, offset], |row| {
        Ok(RecordSummary {
            request_id: row.get(0)?,
            method: row.get(1)?,
            host: row.get(2)?,
            path: row.get(3)?,
            query: row.get(4)?,
            ip: row.get(5)?,
            content_type: row.get(6)?,
            body_size: row.get(7)?,
            tls_enabled: row.get(8)?,
            received_at: timestamp_at(row, 9)?,
        })
    })?;

    let mut summaries = Vec::new();
    for summary in rows {
        summaries.push(summary?);
    }
    Ok(summaries)
}

fn get_record(conn: &Connection, correlation_id: &str) -> Result<Option<StoredRecord>, StoreError> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM requests WHERE correlation_id = ?1 ORDER BY id ASC LIMIT 1"
    );
    let stored = conn
        .query_row(&sql, params![correlation_id], stored_record_from_row)
        .optional()?;
    Ok(stored)
}

fn stored_record_from_row(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    let doc = |idx: usize| -> rusqlite::Result<Option<Document>> {
        Ok(row.get::<_, Option<String>>(idx)?.map(Document::from_raw))
    };

    let record = Record {
        method: row.get(1)?,
        scheme: row.get(2)?,
        protocol: row.get(3)?,
        proto_major: row.get(4)?,
        proto_minor: row.get(5)?,
        url: row.get(6)?,
        request_uri: row.get(7)?,
        host: row.get(8)?,
        path: row.get(9)?,
        query: row.get(10)?,
        fragment: row.get(11)?,
        remote_addr: row.get(12)?,
        ip: row.get(13)?,
        port: row.get(14)?,
        headers: doc(15)?,
        cookies: doc(16)?,
        trailers: doc(17)?,
        transfer_encoding: doc(18)?,
        body: Bytes::from(row.get::<_, Vec<u8>>(19)?),
        content_type: row.get(20)?,
        content_length: row.get(21)?,
        form: doc(22)?,
        post_form: doc(23)?,
        multipart_form: doc(24)?,
        user_agent: row.get(25)?,
        referer: row.get(26)?,
        tls: TlsMetadata {
            enabled: row.get(27)?,
            version: row.get(28)?,
            cipher: row.get(29)?,
            server_name: row.get(30)?,
        },
        received_at: timestamp_at(row, 31)?,
        correlation_id: row.get(32)?,
    };

    Ok(StoredRecord {
        id: row.get(0)?,
        record,
    })
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<chrono::DateTime<chrono::Utc>> {
    let micros: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(micros)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, micros))
}
