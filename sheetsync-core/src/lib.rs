//! # sheetsync-core — Shared spreadsheet model and lifecycle
//!
//! Users own sheets; sheets own grids; grids own rows, columns and cells.
//! Sheets are shared by adding users to their member set.
//!
//! ## Modules
//!
//! - [`model`] — persisted records and read projections
//! - [`store`] — the [`EntityStore`] contract and [`MemoryStore`]
//! - [`access`] — membership guard
//! - [`lifecycle`] — create/get/list/update/delete/share
//! - [`grid`] — grid, row, column and cell wrappers (durable cell path)
//! - [`query`] — list query coercion, pagination, sheet patches
//! - [`api`] — `{ data, message }` envelopes for a routing layer

pub mod access;
pub mod api;
pub mod error;
pub mod grid;
pub mod lifecycle;
pub mod model;
pub mod query;
pub mod store;

pub use access::{can_access, require_access};
pub use api::{ApiError, ApiResponse, ApiResult, CreatedSheet, SheetApi};
pub use error::{ErrorKind, SheetError, StoreError};
pub use grid::{cell_id, GridService};
pub use lifecycle::{DeleteReport, LifecycleConfig, SheetService};
pub use model::{
    now_millis, Cell, Column, Grid, GridSummary, Row, Sheet, SheetDetail, SheetSummary, User,
    DEFAULT_GRID_COLOR, DEFAULT_GRID_TITLE, DEFAULT_SHEET_TITLE,
};
pub use query::{ListQuery, PageMeta, SheetPage, SheetPatch};
pub use store::{EntityStore, MemoryStore};
