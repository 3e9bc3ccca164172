//! Grid, row, column and cell wrappers: the durable editing path.
//!
//! Cell writes are last-write-wins. A cell's id is derived from its grid and
//! coordinate, so two writers racing on the same coordinate overwrite one
//! record instead of creating two.

use std::sync::Arc;
use uuid::Uuid;

use crate::error::SheetError;
use crate::model::{now_millis, Cell, Column, Grid, Row};
use crate::store::EntityStore;

pub struct GridService<S> {
    store: Arc<S>,
}

impl<S: EntityStore> GridService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Add a grid to an existing sheet, appending it to the sheet's grid list.
    pub fn create_grid(
        &self,
        sheet_id: Uuid,
        user_id: Uuid,
        title: &str,
    ) -> Result<Grid, SheetError> {
        if self.store.get_sheet(sheet_id)?.is_none() {
            return Err(SheetError::sheet_missing(sheet_id));
        }
        let grid = Grid::new(sheet_id, user_id, title);
        self.store.insert_grid(&grid)?;

        let appended = self.store.update_sheet(sheet_id, &mut |s| s.grids.push(grid.id));
        match appended {
            Ok(Some(_)) => {
                log::debug!("Grid {} added to sheet {sheet_id}", grid.id);
                Ok(grid)
            }
            outcome => {
                if let Err(e) = self.store.delete_grids(&[grid.id]) {
                    log::warn!("Failed to roll back grid {}: {e}", grid.id);
                }
                match outcome {
                    Err(e) => Err(e.into()),
                    _ => Err(SheetError::sheet_missing(sheet_id)),
                }
            }
        }
    }

    pub fn add_row(&self, grid_id: Uuid, index: u32) -> Result<Row, SheetError> {
        self.require_grid(grid_id)?;
        let row = Row::new(grid_id, index);
        self.store.insert_row(&row)?;
        Ok(row)
    }

    pub fn add_column(&self, grid_id: Uuid, index: u32) -> Result<Column, SheetError> {
        self.require_grid(grid_id)?;
        let column = Column::new(grid_id, index);
        self.store.insert_column(&column)?;
        Ok(column)
    }

    /// Persist `content` at the cell addressed by `row_id` × `column_id`.
    pub fn write_cell(
        &self,
        grid_id: Uuid,
        row_id: Uuid,
        column_id: Uuid,
        content: impl Into<String>,
        writer: Uuid,
    ) -> Result<Cell, SheetError> {
        self.require_grid(grid_id)?;
        let row_ok = self.store.get_row(row_id)?.is_some_and(|r| r.grid_id == grid_id);
        let column_ok = self.store.get_column(column_id)?.is_some_and(|c| c.grid_id == grid_id);
        if !row_ok || !column_ok {
            return Err(SheetError::Validation(format!(
                "Cell coordinate ({row_id}, {column_id}) is not part of grid {grid_id}"
            )));
        }

        let cell = Cell {
            id: cell_id(grid_id, row_id, column_id),
            grid_id,
            row_id,
            column_id,
            content: content.into(),
            updated_by: Some(writer),
            updated_at: now_millis(),
        };
        self.store.put_cell(&cell)?;
        log::trace!("Cell {} written by {writer}", cell.id);
        Ok(cell)
    }

    pub fn cells(&self, grid_id: Uuid) -> Result<Vec<Cell>, SheetError> {
        self.require_grid(grid_id)?;
        Ok(self.store.cells_in_grid(grid_id)?)
    }

    fn require_grid(&self, grid_id: Uuid) -> Result<(), SheetError> {
        match self.store.get_grid(grid_id)? {
            Some(_) => Ok(()),
            None => Err(SheetError::NotFound {
                message: "Grid does not exist",
                id: Some(grid_id),
            }),
        }
    }
}

/// Stable identity for the cell at a grid coordinate.
pub fn cell_id(grid_id: Uuid, row_id: Uuid, column_id: Uuid) -> Uuid {
    let mut name = [0u8; 32];
    name[..16].copy_from_slice(row_id.as_bytes());
    name[16..].copy_from_slice(column_id.as_bytes());
    Uuid::new_v5(&grid_id, &name)
}
