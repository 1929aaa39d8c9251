use crate::config::LibraryPaths;
use crate::error::Result;
use crate::models::{LibraryStats, PhotoRecord, TagCount, TagRecord};
use crate::schema;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

pub fn open_pool(db_path: &Path) -> Result<DbPool> {
    log::info!("Database path: {}", db_path.display());

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(db_path).with_init(configure_connection);
    let pool = r2d2::Pool::builder().max_size(2).build(manager)?;
    Ok(pool)
}

fn configure_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        log::warn!("SQLite refused WAL journaling; running in {mode} mode");
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}

fn run_migrations(connection: &Connection) -> Result<()> {
    log::debug!("Running database migrations...");
    connection.execute_batch(schema::MIGRATION_0001)?;
    log::debug!("Migrations applied successfully.");
    Ok(())
}

pub struct Library {
    pool: DbPool,
    paths: LibraryPaths,
}

impl Library {
    pub fn open(paths: LibraryPaths) -> Result<Self> {
        let pool = open_pool(&paths.db_path)?;
        let conn = pool.get()?;
        run_migrations(&conn)?;
        drop(conn);
        Ok(Self { pool, paths })
    }

    pub fn paths(&self) -> &LibraryPaths {
        &self.paths
    }

    pub fn store(&self) -> Result<PhotoStore> {
        Ok(PhotoStore::new(self.pool.get()?))
    }

    pub fn connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    pub fn stats(&self) -> Result<LibraryStats> {
        let conn = self.connection()?;
        library_stats(&conn)
    }
}

pub struct PhotoStore {
    conn: DbConnection,
}

impl PhotoStore {
    pub fn new(conn: DbConnection) -> Self {
        Self { conn }
    }

    pub fn ensure_schema(&self) -> Result<()> {
        run_migrations(&self.conn)
    }

    /// Starts a write transaction. The batch rolls back unless `commit` is called.
    pub fn begin_batch(&mut self) -> Result<Batch<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(Batch { tx, staged: 0 })
    }

    #[cfg(test)]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

pub struct Batch<'conn> {
    tx: Transaction<'conn>,
    staged: usize,
}

impl Batch<'_> {
    pub fn upsert_photo(&mut self, photo: &PhotoRecord) -> Result<i64> {
        let id = upsert_photo(&self.tx, photo)?;
        self.staged += 1;
        Ok(id)
    }

    pub fn get_or_create_tag(&self, name: &str) -> Result<(i64, bool)> {
        get_or_create_tag(&self.tx, name)
    }

    pub fn link_photo_tag(&self, photo_id: i64, tag_id: i64) -> Result<bool> {
        link_photo_tag(&self.tx, photo_id, tag_id)
    }

    pub fn staged(&self) -> usize {
        self.staged
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn rollback(self) -> Result<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

/// `rotation` is only written on first insert.
pub fn upsert_photo(conn: &Connection, photo: &PhotoRecord) -> Result<i64> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO photos (path, file_name, created_at, location, rotation)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(path) DO UPDATE SET
             file_name = excluded.file_name,
             created_at = excluded.created_at,
             location = excluded.location
         RETURNING id",
    )?;
    let id = stmt.query_row(
        params![
            photo.path,
            photo.file_name,
            photo.created_at,
            photo.location,
            photo.rotation
        ],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn get_or_create_tag(conn: &Connection, name: &str) -> Result<(i64, bool)> {
    let inserted = conn
        .prepare_cached("INSERT INTO tags (name) VALUES (?1) ON CONFLICT(name) DO NOTHING")?
        .execute([name])?;
    let id = conn
        .prepare_cached("SELECT id FROM tags WHERE name = ?1")?
        .query_row([name], |row| row.get(0))?;
    Ok((id, inserted == 1))
}

pub fn link_photo_tag(conn: &Connection, photo_id: i64, tag_id: i64) -> Result<bool> {
    let inserted = conn
        .prepare_cached("INSERT OR IGNORE INTO photo_tags (photo_id, tag_id) VALUES (?1, ?2)")?
        .execute(params![photo_id, tag_id])?;
    Ok(inserted > 0)
}

pub fn library_stats(conn: &Connection) -> Result<LibraryStats> {
    let stats = conn.query_row(
        "SELECT
            (SELECT COUNT(*) FROM photos),
            (SELECT COUNT(*) FROM tags),
            (SELECT COUNT(*) FROM photo_tags)",
        [],
        |row| {
            Ok(LibraryStats {
                photos: row.get(0)?,
                tags: row.get(1)?,
                links: row.get(2)?,
            })
        },
    )?;
    Ok(stats)
}

pub fn list_tags(conn: &Connection) -> Result<Vec<TagCount>> {
    let mut stmt = conn.prepare(
        "SELECT t.name, COUNT(pt.photo_id)
         FROM tags t
         LEFT JOIN photo_tags pt ON pt.tag_id = t.id
         GROUP BY t.id
         ORDER BY t.name",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(TagCount {
            name: row.get(0)?,
            photos: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn get_photo_by_path(conn: &Connection, path: &str) -> Result<Option<PhotoRecord>> {
    let photo = conn
        .query_row(
            "SELECT id, path, file_name, created_at, location, rotation
             FROM photos WHERE path = ?1",
            [path],
            |row| {
                Ok(PhotoRecord {
                    id: Some(row.get(0)?),
                    path: row.get(1)?,
                    file_name: row.get(2)?,
                    created_at: row.get(3)?,
                    location: row.get(4)?,
                    rotation: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(photo)
}

pub fn tags_for_photo(conn: &Connection, photo_id: i64) -> Result<Vec<TagRecord>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name
         FROM tags t
         JOIN photo_tags pt ON pt.tag_id = t.id
         WHERE pt.photo_id = ?1
         ORDER BY t.name",
    )?;
    let rows = stmt.query_map([photo_id], |row| {
        Ok(TagRecord {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
