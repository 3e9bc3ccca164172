//! Entity store contract and the in-memory implementation.
//!
//! Every method is atomic for the single record it touches and nothing more.
//! Multi-record operations (sheet creation, cascading delete) are composed by
//! the lifecycle manager and may be observed half-done by concurrent callers.

use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{Cell, Column, Grid, Row, Sheet, User};

/// CRUD-style access to the persisted spreadsheet tree.
pub trait EntityStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the email is already taken.
    fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    /// Exact, case-sensitive match.
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    fn insert_sheet(&self, sheet: &Sheet) -> Result<(), StoreError>;
    fn get_sheet(&self, id: Uuid) -> Result<Option<Sheet>, StoreError>;
    /// Read-modify-write of one sheet. Returns the stored result, or `None`
    /// when the sheet does not exist.
    fn update_sheet(
        &self,
        id: Uuid,
        mutate: &mut dyn FnMut(&mut Sheet),
    ) -> Result<Option<Sheet>, StoreError>;
    fn delete_sheet(&self, id: Uuid) -> Result<bool, StoreError>;
    /// Unordered.
    fn sheets_for_member(&self, user_id: Uuid) -> Result<Vec<Sheet>, StoreError>;

    fn insert_grid(&self, grid: &Grid) -> Result<(), StoreError>;
    fn get_grid(&self, id: Uuid) -> Result<Option<Grid>, StoreError>;
    fn delete_grids(&self, ids: &[Uuid]) -> Result<u64, StoreError>;

    fn insert_row(&self, row: &Row) -> Result<(), StoreError>;
    fn insert_column(&self, column: &Column) -> Result<(), StoreError>;
    /// Insert or overwrite by cell id.
    fn put_cell(&self, cell: &Cell) -> Result<(), StoreError>;

    fn get_row(&self, id: Uuid) -> Result<Option<Row>, StoreError>;
    fn get_column(&self, id: Uuid) -> Result<Option<Column>, StoreError>;
    fn rows_in_grid(&self, grid_id: Uuid) -> Result<Vec<Row>, StoreError>;
    fn columns_in_grid(&self, grid_id: Uuid) -> Result<Vec<Column>, StoreError>;
    fn cells_in_grid(&self, grid_id: Uuid) -> Result<Vec<Cell>, StoreError>;

    fn delete_rows_in(&self, grid_ids: &[Uuid]) -> Result<u64, StoreError>;
    fn delete_columns_in(&self, grid_ids: &[Uuid]) -> Result<u64, StoreError>;
    fn delete_cells_in(&self, grid_ids: &[Uuid]) -> Result<u64, StoreError>;
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    sheets: HashMap<Uuid, Sheet>,
    grids: HashMap<Uuid, Grid>,
    rows: HashMap<Uuid, Row>,
    columns: HashMap<Uuid, Column>,
    cells: HashMap<Uuid, Cell>,
}

/// Process-local store used by tests and by relays without a storage path.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&tables))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> Result<T, StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&mut tables))
    }
}

fn insert_new<T: Clone>(map: &mut HashMap<Uuid, T>, id: Uuid, value: &T) -> Result<(), StoreError> {
    if map.contains_key(&id) {
        return Err(StoreError::Conflict(format!("record {id} already exists")));
    }
    map.insert(id, value.clone());
    Ok(())
}

fn delete_matching<T>(map: &mut HashMap<Uuid, T>, keep: impl Fn(&T) -> bool) -> u64 {
    let before = map.len();
    map.retain(|_, v| keep(v));
    (before - map.len()) as u64
}

impl EntityStore for MemoryStore {
    fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.write(|t| {
            if t.users.values().any(|u| u.email == user.email) {
                return Err(StoreError::Conflict(format!(
                    "email {} already registered",
                    user.email
                )));
            }
            insert_new(&mut t.users, user.id, user)
        })?
    }

    fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.read(|t| t.users.get(&id).cloned())
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.read(|t| t.users.values().find(|u| u.email == email).cloned())
    }

    fn insert_sheet(&self, sheet: &Sheet) -> Result<(), StoreError> {
        self.write(|t| insert_new(&mut t.sheets, sheet.id, sheet))?
    }

    fn get_sheet(&self, id: Uuid) -> Result<Option<Sheet>, StoreError> {
        self.read(|t| t.sheets.get(&id).cloned())
    }

    fn update_sheet(
        &self,
        id: Uuid,
        mutate: &mut dyn FnMut(&mut Sheet),
    ) -> Result<Option<Sheet>, StoreError> {
        self.write(|t| {
            t.sheets.get_mut(&id).map(|sheet| {
                mutate(sheet);
                sheet.clone()
            })
        })
    }

    fn delete_sheet(&self, id: Uuid) -> Result<bool, StoreError> {
        self.write(|t| t.sheets.remove(&id).is_some())
    }

    fn sheets_for_member(&self, user_id: Uuid) -> Result<Vec<Sheet>, StoreError> {
        self.read(|t| {
            t.sheets
                .values()
                .filter(|s| s.created_by.contains(&user_id))
                .cloned()
                .collect()
        })
    }

    fn insert_grid(&self, grid: &Grid) -> Result<(), StoreError> {
        self.write(|t| insert_new(&mut t.grids, grid.id, grid))?
    }

    fn get_grid(&self, id: Uuid) -> Result<Option<Grid>, StoreError> {
        self.read(|t| t.grids.get(&id).cloned())
    }

    fn delete_grids(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        self.write(|t| delete_matching(&mut t.grids, |g| !ids.contains(&g.id)))
    }

    fn insert_row(&self, row: &Row) -> Result<(), StoreError> {
        self.write(|t| insert_new(&mut t.rows, row.id, row))?
    }

    fn insert_column(&self, column: &Column) -> Result<(), StoreError> {
        self.write(|t| insert_new(&mut t.columns, column.id, column))?
    }

    fn put_cell(&self, cell: &Cell) -> Result<(), StoreError> {
        self.write(|t| {
            t.cells.insert(cell.id, cell.clone());
        })
    }

    fn get_row(&self, id: Uuid) -> Result<Option<Row>, StoreError> {
        self.read(|t| t.rows.get(&id).cloned())
    }

    fn get_column(&self, id: Uuid) -> Result<Option<Column>, StoreError> {
        self.read(|t| t.columns.get(&id).cloned())
    }

    fn rows_in_grid(&self, grid_id: Uuid) -> Result<Vec<Row>, StoreError> {
        self.read(|t| t.rows.values().filter(|r| r.grid_id == grid_id).cloned().collect())
    }

    fn columns_in_grid(&self, grid_id: Uuid) -> Result<Vec<Column>, StoreError> {
        self.read(|t| t.columns.values().filter(|c| c.grid_id == grid_id).cloned().collect())
    }

    fn cells_in_grid(&self, grid_id: Uuid) -> Result<Vec<Cell>, StoreError> {
        self.read(|t| t.cells.values().filter(|c| c.grid_id == grid_id).cloned().collect())
    }

    fn delete_rows_in(&self, grid_ids: &[Uuid]) -> Result<u64, StoreError> {
        self.write(|t| delete_matching(&mut t.rows, |r| !grid_ids.contains(&r.grid_id)))
    }

    fn delete_columns_in(&self, grid_ids: &[Uuid]) -> Result<u64, StoreError> {
        self.write(|t| delete_matching(&mut t.columns, |c| !grid_ids.contains(&c.grid_id)))
    }

    fn delete_cells_in(&self, grid_ids: &[Uuid]) -> Result<u64, StoreError> {
        self.write(|t| delete_matching(&mut t.cells, |c| !grid_ids.contains(&c.grid_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_email_rejected() {
        let store = MemoryStore::new();
        store.insert_user(&User::new("a@example.com", "A")).unwrap();
        let err = store.insert_user(&User::new("a@example.com", "B")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn test_update_missing_sheet_returns_none() {
        let store = MemoryStore::new();
        let result = store.update_sheet(Uuid::new_v4(), &mut |s| s.title.clear()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_sheets_for_member_filters() {
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        store.insert_sheet(&Sheet::new(Uuid::new_v4(), alice, Uuid::new_v4())).unwrap();
        store.insert_sheet(&Sheet::new(Uuid::new_v4(), bob, Uuid::new_v4())).unwrap();

        assert_eq!(store.sheets_for_member(alice).unwrap().len(), 1);
        assert!(store.sheets_for_member(Uuid::new_v4()).unwrap().is_empty());
    }

    #[test]
    fn test_delete_children_by_grid() {
        let store = MemoryStore::new();
        let g1 = Uuid::new_v4();
        let g2 = Uuid::new_v4();
        store.insert_row(&Row::new(g1, 0)).unwrap();
        store.insert_row(&Row::new(g1, 1)).unwrap();
        store.insert_row(&Row::new(g2, 0)).unwrap();

        assert_eq!(store.delete_rows_in(&[g1]).unwrap(), 2);
        assert_eq!(store.rows_in_grid(g2).unwrap().len(), 1);
        assert_eq!(store.delete_rows_in(&[g1]).unwrap(), 0);
    }
}
