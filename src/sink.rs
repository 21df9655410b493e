//! SQLite sink: full-replace load of a run's results.
//!
//! The page stream and the database writer are decoupled by a bounded
//! channel. A blocking task owns the `rusqlite::Connection`, opens one
//! transaction, drops and recreates the target tables, inserts each record as
//! it arrives and commits when the stream ends. Until the commit, readers see
//! the previous run's table; if the load fails, that table is kept.
//!
//! ## Layout
//!
//! Database file `<database_dir>/<dataset>.db` holds:
//!
//! | Table | Rows |
//! |-------|------|
//! | `<table>` | one per page; `ocr_response` / `menu_data` as JSON text |
//! | `<table>__menu_items` | one per menu item, linked by `_parent_page_number` |
//! | `_loads` | one per completed load |

use crate::config::LoaderConfig;
use crate::error::MenuOcrError;
use crate::output::MenuExtractionResult;
use chrono::Utc;
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::{debug, info};

static NON_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Suffix of the child table holding flattened menu items.
pub const ITEMS_TABLE_SUFFIX: &str = "__menu_items";

/// What a completed load wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadInfo {
    pub database_path: PathBuf,
    pub table: String,
    pub items_table: String,
    pub load_id: String,
    pub pages_loaded: usize,
    pub failed_pages: usize,
    pub items_loaded: usize,
    pub completed_at: String,
}

/// Normalise a name into a safe snake_case SQL identifier.
///
/// `"Seoul Kitchen (2024).pdf"` → `"seoul_kitchen_2024_pdf"`.
pub fn normalize_identifier(name: &str) -> String {
    let lower = name.to_lowercase();
    let ident = NON_IDENT.replace_all(&lower, "_");
    let ident = ident.trim_matches('_');
    if ident.is_empty() {
        return "menu".to_string();
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("_{ident}");
    }
    ident.to_string()
}

/// Table name for a PDF: its file name, normalised.
pub fn table_name_for(pdf_path: &Path) -> String {
    let file_name = pdf_path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    normalize_identifier(&file_name)
}

/// Loads page-result streams into SQLite.
#[derive(Debug, Clone)]
pub struct SqliteLoader {
    config: LoaderConfig,
}

impl SqliteLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn database_path(&self) -> PathBuf {
        self.config.database_path()
    }

    /// Consume `records` and replace `table` with them.
    ///
    /// The stream is driven to completion unless the writer fails, in which
    /// case consumption stops and the writer's error is returned.
    pub async fn load<S>(&self, table: &str, records: S) -> Result<LoadInfo, MenuOcrError>
    where
        S: Stream<Item = MenuExtractionResult> + Send,
    {
        let table = normalize_identifier(table);
        let db_path = self.database_path();
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        info!("Loading into {} table '{}'", db_path.display(), table);
        let writer_table = table.clone();
        let writer =
            tokio::task::spawn_blocking(move || write_replace(&db_path, &writer_table, rx));

        let mut records = Box::pin(records);
        while let Some(record) = records.next().await {
            if tx.send(record).await.is_err() {
                // Writer gave up; its error is reported below.
                break;
            }
        }
        drop(tx);

        writer.await.map_err(|e| MenuOcrError::Load {
            table,
            detail: format!("writer task panicked: {e}"),
        })?
    }
}

fn write_replace(
    db_path: &Path,
    table: &str,
    mut rx: mpsc::Receiver<MenuExtractionResult>,
) -> Result<LoadInfo, MenuOcrError> {
    let load_err = |detail: String| MenuOcrError::Load {
        table: table.to_string(),
        detail,
    };
    let db = |e: rusqlite::Error| load_err(e.to_string());

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| load_err(format!("cannot create {}: {e}", parent.display())))?;
        }
    }

    let mut conn = Connection::open(db_path).map_err(db)?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _loads (
            load_id      TEXT NOT NULL,
            table_name   TEXT NOT NULL,
            pages        INTEGER NOT NULL,
            failed_pages INTEGER NOT NULL,
            items        INTEGER NOT NULL,
            inserted_at  TEXT NOT NULL
        );",
    )
    .map_err(db)?;

    let items_table = format!("{table}{ITEMS_TABLE_SUFFIX}");
    let load_id = format!("{}", Utc::now().timestamp_micros());

    let txn = conn.transaction().map_err(db)?;
    txn.execute_batch(&format!(
        "DROP TABLE IF EXISTS \"{items_table}\";
         DROP TABLE IF EXISTS \"{table}\";
         CREATE TABLE \"{table}\" (
            pdf_path     TEXT NOT NULL,
            page_number  INTEGER NOT NULL,
            total_pages  INTEGER NOT NULL,
            ocr_response TEXT,
            menu_data    TEXT,
            item_count   INTEGER NOT NULL,
            error        TEXT,
            processed_at TEXT NOT NULL,
            _load_id     TEXT NOT NULL
         );
         CREATE TABLE \"{items_table}\" (
            _parent_page_number INTEGER NOT NULL,
            _list_idx           INTEGER NOT NULL,
            name                TEXT NOT NULL,
            description         TEXT NOT NULL,
            price               REAL NOT NULL,
            tags                TEXT NOT NULL,
            category            TEXT NOT NULL,
            sub_category        TEXT,
            ingredients         TEXT NOT NULL,
            dietary_tags        TEXT NOT NULL,
            spiciness_level     REAL NOT NULL,
            portion_size        TEXT,
            _load_id            TEXT NOT NULL
         );"
    ))
    .map_err(db)?;

    let mut pages = 0usize;
    let mut failed = 0usize;
    let mut items = 0usize;
    {
        let mut page_stmt = txn
            .prepare(&format!(
                "INSERT INTO \"{table}\"
                 (pdf_path, page_number, total_pages, ocr_response, menu_data,
                  item_count, error, processed_at, _load_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ))
            .map_err(db)?;
        let mut item_stmt = txn
            .prepare(&format!(
                "INSERT INTO \"{items_table}\"
                 (_parent_page_number, _list_idx, name, description, price, tags,
                  category, sub_category, ingredients, dietary_tags, spiciness_level,
                  portion_size, _load_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ))
            .map_err(db)?;

        while let Some(r) = rx.blocking_recv() {
            page_stmt
                .execute(params![
                    r.pdf_path,
                    r.page_number as i64,
                    r.total_pages as i64,
                    r.ocr_response.as_ref().map(|v| v.to_string()),
                    r.menu_data.as_ref().map(|v| v.to_string()),
                    r.item_count as i64,
                    r.error,
                    r.processed_at,
                    load_id,
                ])
                .map_err(db)?;

            for (idx, item) in r.menu_items.iter().enumerate() {
                let list = |v: &Vec<String>| {
                    serde_json::to_string(v).map_err(|e| load_err(e.to_string()))
                };
                item_stmt
                    .execute(params![
                        r.page_number as i64,
                        idx as i64,
                        item.name,
                        item.description,
                        item.price,
                        list(&item.tags)?,
                        item.category,
                        item.sub_category,
                        list(&item.ingredients)?,
                        list(&item.dietary_tags)?,
                        item.spiciness_level,
                        item.portion_size,
                        load_id,
                    ])
                    .map_err(db)?;
            }

            pages += 1;
            items += r.menu_items.len();
            if !r.is_success() {
                failed += 1;
            }
            debug!("Staged page {} ({} items)", r.page_number, r.menu_items.len());
        }
    }

    let completed_at = Utc::now().to_rfc3339();
    txn.execute(
        "INSERT INTO _loads (load_id, table_name, pages, failed_pages, items, inserted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            load_id,
            table,
            pages as i64,
            failed as i64,
            items as i64,
            completed_at
        ],
    )
    .map_err(db)?;
    txn.commit().map_err(db)?;

    info!(
        "Loaded {} pages ({} failed), {} items into '{}'",
        pages, failed, items, table
    );

    Ok(LoadInfo {
        database_path: db_path.to_path_buf(),
        table: table.to_string(),
        items_table,
        load_id,
        pages_loaded: pages,
        failed_pages: failed,
        items_loaded: items,
        completed_at,
    })
}
