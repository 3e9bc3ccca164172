//! Sheet lifecycle: create, read, list, update, delete, share.
//!
//! The manager composes single-record store calls; it takes no locks of its
//! own, so concurrent calls on the same sheet race at the store.

use std::sync::Arc;
use uuid::Uuid;

use crate::access::require_access;
use crate::error::SheetError;
use crate::model::{
    now_millis, Grid, GridSummary, Sheet, SheetDetail, SheetSummary, DEFAULT_GRID_TITLE,
};
use crate::query::{ListQuery, PageMeta, SheetPage, SheetPatch};
use crate::store::EntityStore;

#[derive(Debug, Clone, Default)]
pub struct LifecycleConfig {
    /// Require the acting user to be a member before update and delete.
    /// Off by default to keep the established behavior of those operations.
    pub enforce_membership_on_mutation: bool,
}

/// Records removed by a cascading delete, per collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub cells: u64,
    pub rows: u64,
    pub columns: u64,
    pub grids: u64,
}

pub struct SheetService<S> {
    store: Arc<S>,
    config: LifecycleConfig,
}

impl<S: EntityStore> SheetService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, LifecycleConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: LifecycleConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Create a sheet owned by `user_id` together with its first grid.
    ///
    /// The grid is written first and the sheet is inserted already pointing at
    /// it, so a sheet with no grids is never visible. A failed sheet insert
    /// removes the grid again.
    pub fn create(&self, user_id: Uuid) -> Result<Uuid, SheetError> {
        let sheet_id = Uuid::new_v4();
        let grid = Grid::new(sheet_id, user_id, DEFAULT_GRID_TITLE);
        self.store.insert_grid(&grid)?;

        let sheet = Sheet::new(sheet_id, user_id, grid.id);
        if let Err(e) = self.store.insert_sheet(&sheet) {
            if let Err(cleanup) = self.store.delete_grids(&[grid.id]) {
                log::warn!(
                    "Failed to roll back grid {} after sheet insert error: {cleanup}",
                    grid.id
                );
            }
            return Err(e.into());
        }

        log::info!("Sheet {sheet_id} created by {user_id} with grid {}", grid.id);
        Ok(sheet_id)
    }

    /// Fetch a sheet for a member and stamp `last_opened_at`.
    ///
    /// The stamp is best-effort: a failed write is logged and the read still succeeds.
    pub fn get_by_id(&self, user_id: Uuid, sheet_id: Uuid) -> Result<SheetDetail, SheetError> {
        let sheet = self
            .store
            .get_sheet(sheet_id)?
            .ok_or_else(|| SheetError::sheet_missing(sheet_id))?;
        require_access(user_id, &sheet)?;

        let mut grids = Vec::with_capacity(sheet.grids.len());
        for grid_id in &sheet.grids {
            match self.store.get_grid(*grid_id)? {
                Some(grid) => grids.push(GridSummary::from(&grid)),
                None => log::debug!("Sheet {sheet_id} references missing grid {grid_id}"),
            }
        }

        let opened_at = now_millis();
        let touched = self.store.update_sheet(sheet_id, &mut |s| {
            s.last_opened_at = Some(s.last_opened_at.map_or(opened_at, |prev| prev.max(opened_at)));
        });
        if let Err(e) = touched {
            log::warn!("Failed to record last open of sheet {sheet_id}: {e}");
        }

        Ok(SheetDetail {
            id: sheet.id,
            title: sheet.title,
            grids,
        })
    }

    /// Sheets the user belongs to whose title matches, oldest first.
    pub fn list(&self, user_id: Uuid, query: &ListQuery) -> Result<SheetPage, SheetError> {
        let mut matching: Vec<Sheet> = self
            .store
            .sheets_for_member(user_id)?
            .into_iter()
            .filter(|s| query.matches(&s.title))
            .collect();
        matching.sort_by_key(|s| (s.created_at, s.id));

        let page_meta = PageMeta::new(matching.len() as u64, query);
        let sheets = matching
            .into_iter()
            .skip(query.skip())
            .take(query.limit as usize)
            .map(SheetSummary::from)
            .collect();

        Ok(SheetPage { sheets, page_meta })
    }

    pub fn update(
        &self,
        user_id: Uuid,
        sheet_id: Uuid,
        patch: SheetPatch,
    ) -> Result<(), SheetError> {
        patch.validate()?;
        let sheet = self
            .store
            .get_sheet(sheet_id)?
            .ok_or_else(|| SheetError::sheet_missing(sheet_id))?;
        if self.config.enforce_membership_on_mutation {
            require_access(user_id, &sheet)?;
        }

        let updated = self.store.update_sheet(sheet_id, &mut |s| {
            if let Some(title) = &patch.title {
                s.title = title.trim().to_string();
            }
        })?;
        if updated.is_none() {
            return Err(SheetError::sheet_missing(sheet_id));
        }

        log::info!("Sheet {sheet_id} updated by {user_id}");
        Ok(())
    }

    /// Remove a sheet and everything under its grids.
    ///
    /// Children go first and the sheet record last, so an interrupted cascade
    /// leaves the sheet still owning whatever survived.
    pub fn delete(&self, user_id: Uuid, sheet_id: Uuid) -> Result<DeleteReport, SheetError> {
        let sheet = self
            .store
            .get_sheet(sheet_id)?
            .ok_or_else(|| SheetError::sheet_missing(sheet_id))?;
        if self.config.enforce_membership_on_mutation {
            require_access(user_id, &sheet)?;
        }

        let grids = &sheet.grids;
        let report = DeleteReport {
            cells: self.store.delete_cells_in(grids)?,
            rows: self.store.delete_rows_in(grids)?,
            columns: self.store.delete_columns_in(grids)?,
            grids: self.store.delete_grids(grids)?,
        };
        self.store.delete_sheet(sheet_id)?;

        log::info!(
            "Sheet {sheet_id} deleted by {user_id}: {} grids, {} rows, {} columns, {} cells",
            report.grids,
            report.rows,
            report.columns,
            report.cells
        );
        Ok(report)
    }

    /// Share a sheet with the user registered under `email`.
    pub fn add_user_to_sheet(&self, sheet_id: Uuid, email: &str) -> Result<(), SheetError> {
        let user = self
            .store
            .find_user_by_email(email)?
            .ok_or(SheetError::NotFound { message: "User not found", id: None })?;
        let sheet = self
            .store
            .get_sheet(sheet_id)?
            .ok_or(SheetError::NotFound { message: "Sheet not found", id: Some(sheet_id) })?;
        if sheet.created_by.contains(&user.id) {
            return Err(SheetError::AlreadyMember { sheet_id, user_id: user.id });
        }

        let updated = self.store.update_sheet(sheet_id, &mut |s| {
            s.created_by.insert(user.id);
        })?;
        if updated.is_none() {
            return Err(SheetError::NotFound { message: "Sheet not found", id: Some(sheet_id) });
        }

        log::info!("User {} added to sheet {sheet_id}", user.id);
        Ok(())
    }
}
