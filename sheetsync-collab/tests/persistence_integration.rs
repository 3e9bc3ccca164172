//! Sheet lifecycle against the RocksDB store.
//!
//! Verifies:
//! - Create / detail / list roundtrip through the on-disk store
//! - Cascading delete removes every grid child and leaves other sheets intact
//! - Data survives closing and reopening the database
//! - Sharing by email persists membership

use sheetsync_collab::storage::{RocksStore, StoreConfig};
use sheetsync_core::{
    DeleteReport, EntityStore, ErrorKind, GridService, ListQuery, SheetPatch, SheetService, User,
    DEFAULT_GRID_TITLE, DEFAULT_SHEET_TITLE,
};

use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use uuid::Uuid;

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn open_store(path: &Path) -> Arc<RocksStore> {
    Arc::new(RocksStore::open(StoreConfig::for_testing(path)).unwrap())
}

/// Create a sheet and fill its first grid with a 2×2 block of cells.
fn populated_sheet(store: &Arc<RocksStore>, owner: Uuid) -> (Uuid, Uuid) {
    let sheets = SheetService::new(store.clone());
    let grids = GridService::new(store.clone());

    let sheet_id = sheets.create(owner).unwrap();
    let grid_id = store.get_sheet(sheet_id).unwrap().unwrap().grids[0];
    let rows: Vec<_> = (0..2).map(|i| grids.add_row(grid_id, i).unwrap()).collect();
    let cols: Vec<_> = (0..2).map(|i| grids.add_column(grid_id, i).unwrap()).collect();
    for row in &rows {
        for col in &cols {
            grids
                .write_cell(grid_id, row.id, col.id, format!("{}:{}", row.index, col.index), owner)
                .unwrap();
        }
    }
    (sheet_id, grid_id)
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

#[test]
fn test_create_and_detail_on_disk() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let sheets = SheetService::new(store.clone());
    let owner = Uuid::new_v4();

    let sheet_id = sheets.create(owner).unwrap();
    let detail = sheets.get_by_id(owner, sheet_id).unwrap();

    assert_eq!(detail.title, DEFAULT_SHEET_TITLE);
    assert_eq!(detail.grids.len(), 1);
    assert_eq!(detail.grids[0].title, DEFAULT_GRID_TITLE);
    assert_eq!(detail.grids[0].sheet_id, sheet_id);
    assert!(store.get_sheet(sheet_id).unwrap().unwrap().last_opened_at.is_some());
}

#[test]
fn test_outsider_is_denied() {
    let dir = tempdir().unwrap();
    let sheets = SheetService::new(open_store(dir.path()));
    let sheet_id = sheets.create(Uuid::new_v4()).unwrap();

    let err = sheets.get_by_id(Uuid::new_v4(), sheet_id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);
}

#[test]
fn test_list_search_and_pages() {
    let dir = tempdir().unwrap();
    let sheets = SheetService::new(open_store(dir.path()));
    let owner = Uuid::new_v4();

    let ids: Vec<_> = (0..5).map(|_| sheets.create(owner).unwrap()).collect();
    sheets
        .update(owner, ids[3], SheetPatch { title: Some("Quarterly Budget".into()) })
        .unwrap();

    let page = sheets.list(owner, &ListQuery { search: String::new(), page: 2, limit: 2 }).unwrap();
    assert_eq!(page.page_meta.total, 5);
    assert_eq!(page.page_meta.total_pages, 3);
    let listed: Vec<_> = page.sheets.iter().map(|s| s.id).collect();
    assert_eq!(listed, vec![ids[2], ids[3]]);

    let query = ListQuery {
        search: "budget".into(),
        ..ListQuery::default()
    };
    let found = sheets.list(owner, &query).unwrap();
    assert_eq!(found.sheets.len(), 1);
    assert_eq!(found.sheets[0].id, ids[3]);
}

// ─── Cascade ─────────────────────────────────────────────────────────────────

#[test]
fn test_cascading_delete_on_disk() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let sheets = SheetService::new(store.clone());
    let owner = Uuid::new_v4();

    let (doomed, doomed_grid) = populated_sheet(&store, owner);
    let (kept, kept_grid) = populated_sheet(&store, owner);

    let report = sheets.delete(owner, doomed).unwrap();
    assert_eq!(report, DeleteReport { cells: 4, rows: 2, columns: 2, grids: 1 });

    assert!(store.get_sheet(doomed).unwrap().is_none());
    assert!(store.get_grid(doomed_grid).unwrap().is_none());
    assert!(store.rows_in_grid(doomed_grid).unwrap().is_empty());
    assert!(store.columns_in_grid(doomed_grid).unwrap().is_empty());
    assert!(store.cells_in_grid(doomed_grid).unwrap().is_empty());

    assert!(store.get_sheet(kept).unwrap().is_some());
    assert_eq!(store.rows_in_grid(kept_grid).unwrap().len(), 2);
    assert_eq!(store.cells_in_grid(kept_grid).unwrap().len(), 4);
}

#[test]
fn test_rewriting_a_cell_keeps_one_record() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    let owner = Uuid::new_v4();
    let (_, grid_id) = populated_sheet(&store, owner);
    let grids = GridService::new(store.clone());

    let row = store.rows_in_grid(grid_id).unwrap()[0].clone();
    let col = store.columns_in_grid(grid_id).unwrap()[0].clone();
    grids.write_cell(grid_id, row.id, col.id, "first", owner).unwrap();
    grids.write_cell(grid_id, row.id, col.id, "second", owner).unwrap();

    let cells = grids.cells(grid_id).unwrap();
    assert_eq!(cells.len(), 4);
    let cell = cells.iter().find(|c| c.row_id == row.id && c.column_id == col.id).unwrap();
    assert_eq!(cell.content, "second");
}

// ─── Reopen ──────────────────────────────────────────────────────────────────

#[test]
fn test_data_survives_reopen() {
    let dir = tempdir().unwrap();
    let owner = Uuid::new_v4();

    let (sheet_id, grid_id) = {
        let store = open_store(dir.path());
        let ids = populated_sheet(&store, owner);
        SheetService::new(store.clone())
            .update(owner, ids.0, SheetPatch { title: Some("Inventory".into()) })
            .unwrap();
        store.sync().unwrap();
        ids
    };

    let store = open_store(dir.path());
    let sheets = SheetService::new(store.clone());
    let detail = sheets.get_by_id(owner, sheet_id).unwrap();
    assert_eq!(detail.title, "Inventory");
    assert_eq!(detail.grids[0].id, grid_id);
    assert_eq!(store.cells_in_grid(grid_id).unwrap().len(), 4);
}

// ─── Sharing ─────────────────────────────────────────────────────────────────

#[test]
fn test_sharing_persists_membership() {
    let dir = tempdir().unwrap();
    let owner = Uuid::new_v4();
    let guest = User::new("guest@example.com", "Guest");

    let sheet_id = {
        let store = open_store(dir.path());
        store.insert_user(&guest).unwrap();
        let sheets = SheetService::new(store.clone());
        let sheet_id = sheets.create(owner).unwrap();
        sheets.add_user_to_sheet(sheet_id, "guest@example.com").unwrap();

        let again = sheets.add_user_to_sheet(sheet_id, "guest@example.com").unwrap_err();
        assert_eq!(again.kind(), ErrorKind::AlreadyMember);
        store.sync().unwrap();
        sheet_id
    };

    let store = open_store(dir.path());
    let sheets = SheetService::new(store.clone());
    assert!(sheets.get_by_id(guest.id, sheet_id).is_ok());
    assert_eq!(store.get_sheet(sheet_id).unwrap().unwrap().created_by.len(), 2);

    let listed = sheets.list(guest.id, &ListQuery::default()).unwrap();
    assert_eq!(listed.sheets.len(), 1);
}
