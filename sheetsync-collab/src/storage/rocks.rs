//! RocksDB-backed entity store.
//!
//! Column families:
//! - `users`       — User records keyed by id
//! - `user_emails` — email → user id (uniqueness index)
//! - `sheets`      — Sheet records keyed by id
//! - `grids`       — Grid records keyed by id
//! - `rows`, `columns`, `cells` — keyed by `grid_id ‖ record_id` so every
//!   child of a grid sits under one 16-byte prefix
//! - `parents`     — row/column id → grid id, for point lookups
//!
//! Values are bincode-encoded and LZ4-compressed. Each public method writes
//! through one `WriteBatch`, which is the only atomicity this store offers.

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Direction, IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use sheetsync_core::{Cell, Column, EntityStore, Grid, Row, Sheet, StoreError, User};

const CF_USERS: &str = "users";
const CF_USER_EMAILS: &str = "user_emails";
const CF_SHEETS: &str = "sheets";
const CF_GRIDS: &str = "grids";
const CF_ROWS: &str = "rows";
const CF_COLUMNS: &str = "columns";
const CF_CELLS: &str = "cells";
const CF_PARENTS: &str = "parents";

/// All column family names for initialization.
const COLUMN_FAMILIES: &[&str] = &[
    CF_USERS, CF_USER_EMAILS, CF_SHEETS, CF_GRIDS, CF_ROWS, CF_COLUMNS, CF_CELLS, CF_PARENTS,
];

/// Families keyed by `grid_id ‖ record_id`.
const GRID_CHILD_FAMILIES: &[&str] = &[CF_ROWS, CF_COLUMNS, CF_CELLS];

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 128MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 512)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 32MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sheetsync_data"),
            block_cache_size: 128 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 512,
            write_buffer_size: 32 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Create config for testing (small caches, temp directory).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
        }
    }
}

fn db_err(e: rocksdb::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn encode_record<T: Serialize>(record: &T) -> Result<Vec<u8>, StoreError> {
    let bytes = bincode::serde::encode_to_vec(record, bincode::config::standard())
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(lz4_flex::compress_prepend_size(&bytes))
}

fn decode_record<T: DeserializeOwned>(value: &[u8]) -> Result<T, StoreError> {
    let bytes = lz4_flex::decompress_size_prepended(value)
        .map_err(|e| StoreError::Deserialization(e.to_string()))?;
    let (record, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
        .map_err(|e| StoreError::Deserialization(e.to_string()))?;
    Ok(record)
}

/// Build a child key: grid_id (16 bytes) + record_id (16 bytes).
fn child_key(grid_id: Uuid, id: Uuid) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(grid_id.as_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

/// RocksDB-backed entity store.
pub struct RocksStore {
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
    /// Serializes read-modify-write sequences (existence checks, sheet updates).
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open the store, creating the database and column families if needed.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )
        .map_err(db_err)?;

        log::info!("Entity store opened at {}", config.path.display());
        Ok(Self {
            db,
            config,
            write_lock: Mutex::new(()),
        })
    }

    /// Build column-family-specific options.
    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        block_opts.set_block_size(16 * 1024);
        opts.set_block_based_table_factory(&block_opts);

        // Values are already LZ4-compressed.
        opts.set_compression_type(DBCompressionType::None);
        opts.set_write_buffer_size(config.write_buffer_size);

        if GRID_CHILD_FAMILIES.contains(&name) {
            // Many small writes, prefix-scanned by grid_id
            opts.set_max_write_buffer_number(4);
            opts.set_prefix_extractor(rocksdb::SliceTransform::create_fixed_prefix(16));
        } else {
            // Point lookups by id, served by the bloom filter above
            opts.set_max_write_buffer_number(2);
        }

        opts
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Flush every column family's memtable to disk.
    pub fn sync(&self) -> Result<(), StoreError> {
        for name in COLUMN_FAMILIES {
            self.db.flush_cf(self.cf(name)?).map_err(db_err)?;
        }
        Ok(())
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("Column family '{name}' not found")))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, StoreError> {
        self.write_lock.lock().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts).map_err(db_err)
    }

    fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>, StoreError> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key).map_err(db_err)? {
            Some(value) => decode_record(&value).map(Some),
            None => Ok(None),
        }
    }

    fn exists(&self, cf_name: &str, key: &[u8]) -> Result<bool, StoreError> {
        let cf = self.cf(cf_name)?;
        Ok(self.db.get_pinned_cf(cf, key).map_err(db_err)?.is_some())
    }

    fn insert_new<T: Serialize>(
        &self,
        cf_name: &str,
        key: &[u8],
        record: &T,
    ) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        if self.exists(cf_name, key)? {
            return Err(StoreError::Conflict(format!("{cf_name} record already exists")));
        }
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(cf_name)?, key, encode_record(record)?);
        self.write(batch)
    }

    /// Every record under a grid prefix, as `(key, value)` pairs.
    fn scan_grid(
        &self,
        cf_name: &str,
        grid_id: Uuid,
    ) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>, StoreError> {
        let cf = self.cf(cf_name)?;
        let prefix = grid_id.as_bytes();
        let mut out = Vec::new();
        let iter = self.db.iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(db_err)?;
            if key.len() < 32 || &key[..16] != prefix {
                break;
            }
            out.push((key, value));
        }
        Ok(out)
    }

    fn children_of<T: DeserializeOwned>(
        &self,
        cf_name: &str,
        grid_id: Uuid,
    ) -> Result<Vec<T>, StoreError> {
        self.scan_grid(cf_name, grid_id)?
            .iter()
            .map(|(_, value)| decode_record(value))
            .collect()
    }

    /// Delete every child under the given grids in one batch.
    fn delete_children(
        &self,
        cf_name: &str,
        grid_ids: &[Uuid],
        track_parents: bool,
    ) -> Result<u64, StoreError> {
        let cf = self.cf(cf_name)?;
        let cf_parents = self.cf(CF_PARENTS)?;
        let mut batch = WriteBatch::default();
        let mut count = 0u64;

        for grid_id in grid_ids {
            for (key, _) in self.scan_grid(cf_name, *grid_id)? {
                batch.delete_cf(cf, &key);
                if track_parents {
                    batch.delete_cf(cf_parents, &key[16..32]);
                }
                count += 1;
            }
        }

        if count > 0 {
            self.write(batch)?;
        }
        Ok(count)
    }

    fn insert_child<T: Serialize>(
        &self,
        cf_name: &str,
        grid_id: Uuid,
        id: Uuid,
        record: &T,
    ) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        if self.exists(CF_PARENTS, id.as_bytes())? {
            return Err(StoreError::Conflict(format!("{cf_name} record {id} already exists")));
        }
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(cf_name)?, child_key(grid_id, id), encode_record(record)?);
        batch.put_cf(self.cf(CF_PARENTS)?, id.as_bytes(), grid_id.as_bytes());
        self.write(batch)
    }

    fn get_child<T: DeserializeOwned>(
        &self,
        cf_name: &str,
        id: Uuid,
    ) -> Result<Option<T>, StoreError> {
        let cf_parents = self.cf(CF_PARENTS)?;
        let Some(parent) = self.db.get_cf(cf_parents, id.as_bytes()).map_err(db_err)? else {
            return Ok(None);
        };
        let grid_id = Uuid::from_slice(&parent)
            .map_err(|_| StoreError::Deserialization("Invalid parent grid id".into()))?;
        self.get(cf_name, &child_key(grid_id, id))
    }
}

impl EntityStore for RocksStore {
    fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        if self.exists(CF_USER_EMAILS, user.email.as_bytes())? {
            return Err(StoreError::Conflict(format!("email {} already registered", user.email)));
        }
        if self.exists(CF_USERS, user.id.as_bytes())? {
            return Err(StoreError::Conflict(format!("user {} already exists", user.id)));
        }
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_USERS)?, user.id.as_bytes(), encode_record(user)?);
        batch.put_cf(self.cf(CF_USER_EMAILS)?, user.email.as_bytes(), user.id.as_bytes());
        self.write(batch)
    }

    fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.get(CF_USERS, id.as_bytes())
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let cf = self.cf(CF_USER_EMAILS)?;
        match self.db.get_cf(cf, email.as_bytes()).map_err(db_err)? {
            Some(id) => {
                let id = Uuid::from_slice(&id).map_err(|_| {
                    StoreError::Deserialization("Invalid user id in email index".into())
                })?;
                self.get_user(id)
            }
            None => Ok(None),
        }
    }

    fn insert_sheet(&self, sheet: &Sheet) -> Result<(), StoreError> {
        self.insert_new(CF_SHEETS, sheet.id.as_bytes(), sheet)
    }

    fn get_sheet(&self, id: Uuid) -> Result<Option<Sheet>, StoreError> {
        self.get(CF_SHEETS, id.as_bytes())
    }

    fn update_sheet(
        &self,
        id: Uuid,
        mutate: &mut dyn FnMut(&mut Sheet),
    ) -> Result<Option<Sheet>, StoreError> {
        let _guard = self.lock()?;
        let Some(mut sheet) = self.get::<Sheet>(CF_SHEETS, id.as_bytes())? else {
            return Ok(None);
        };
        mutate(&mut sheet);

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_SHEETS)?, id.as_bytes(), encode_record(&sheet)?);
        self.write(batch)?;
        Ok(Some(sheet))
    }

    fn delete_sheet(&self, id: Uuid) -> Result<bool, StoreError> {
        let _guard = self.lock()?;
        if !self.exists(CF_SHEETS, id.as_bytes())? {
            return Ok(false);
        }
        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(CF_SHEETS)?, id.as_bytes());
        self.write(batch)?;
        Ok(true)
    }

    fn sheets_for_member(&self, user_id: Uuid) -> Result<Vec<Sheet>, StoreError> {
        let cf = self.cf(CF_SHEETS)?;
        let mut sheets = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item.map_err(db_err)?;
            let sheet: Sheet = decode_record(&value)?;
            if sheet.created_by.contains(&user_id) {
                sheets.push(sheet);
            }
        }
        Ok(sheets)
    }

    fn insert_grid(&self, grid: &Grid) -> Result<(), StoreError> {
        self.insert_new(CF_GRIDS, grid.id.as_bytes(), grid)
    }

    fn get_grid(&self, id: Uuid) -> Result<Option<Grid>, StoreError> {
        self.get(CF_GRIDS, id.as_bytes())
    }

    fn delete_grids(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        let cf = self.cf(CF_GRIDS)?;
        let mut batch = WriteBatch::default();
        let mut count = 0u64;
        for id in ids {
            if self.exists(CF_GRIDS, id.as_bytes())? {
                batch.delete_cf(cf, id.as_bytes());
                count += 1;
            }
        }
        if count > 0 {
            self.write(batch)?;
        }
        Ok(count)
    }

    fn insert_row(&self, row: &Row) -> Result<(), StoreError> {
        self.insert_child(CF_ROWS, row.grid_id, row.id, row)
    }

    fn insert_column(&self, column: &Column) -> Result<(), StoreError> {
        self.insert_child(CF_COLUMNS, column.grid_id, column.id, column)
    }

    fn put_cell(&self, cell: &Cell) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_CELLS)?, child_key(cell.grid_id, cell.id), encode_record(cell)?);
        self.write(batch)
    }

    fn get_row(&self, id: Uuid) -> Result<Option<Row>, StoreError> {
        self.get_child(CF_ROWS, id)
    }

    fn get_column(&self, id: Uuid) -> Result<Option<Column>, StoreError> {
        self.get_child(CF_COLUMNS, id)
    }

    fn rows_in_grid(&self, grid_id: Uuid) -> Result<Vec<Row>, StoreError> {
        self.children_of(CF_ROWS, grid_id)
    }

    fn columns_in_grid(&self, grid_id: Uuid) -> Result<Vec<Column>, StoreError> {
        self.children_of(CF_COLUMNS, grid_id)
    }

    fn cells_in_grid(&self, grid_id: Uuid) -> Result<Vec<Cell>, StoreError> {
        self.children_of(CF_CELLS, grid_id)
    }

    fn delete_rows_in(&self, grid_ids: &[Uuid]) -> Result<u64, StoreError> {
        self.delete_children(CF_ROWS, grid_ids, true)
    }

    fn delete_columns_in(&self, grid_ids: &[Uuid]) -> Result<u64, StoreError> {
        self.delete_children(CF_COLUMNS, grid_ids, true)
    }

    fn delete_cells_in(&self, grid_ids: &[Uuid]) -> Result<u64, StoreError> {
        self.delete_children(CF_CELLS, grid_ids, false)
    }
}

/// Get number of CPU cores for RocksDB parallelism.
fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}
