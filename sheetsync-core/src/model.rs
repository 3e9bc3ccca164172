//! Persisted records of the spreadsheet tree.
//!
//! ```text
//! Sheet ──owns──► Grid ──owns──► Row
//!   │                   ├─owns──► Column
//!   │                   └─owns──► Cell ──refs──► Row, Column
//!   └──shared by──► User (many-to-many, never owned)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use uuid::Uuid;

pub const DEFAULT_SHEET_TITLE: &str = "Untitled Spreadsheet";
pub const DEFAULT_GRID_TITLE: &str = "Sheet 1";
pub const DEFAULT_GRID_COLOR: &str = "#FFFFFF";

static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

/// Milliseconds since the Unix epoch, strictly increasing within the process.
///
/// Two records created in the same millisecond still sort in creation order.
pub fn now_millis() -> u64 {
    let wall = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let mut prev = LAST_TIMESTAMP.load(Ordering::Relaxed);
    loop {
        let next = wall.max(prev + 1);
        match LAST_TIMESTAMP.compare_exchange_weak(
            prev,
            next,
            Ordering::SeqCst,
            Ordering::Relaxed,
        ) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

impl User {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            name: name.into(),
        }
    }
}

/// Top-level shared document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sheet {
    pub id: Uuid,
    pub title: String,
    /// Every user with access. Named after the field it replaces; it is a member set.
    pub created_by: BTreeSet<Uuid>,
    /// Owned grids, in display order.
    pub grids: Vec<Uuid>,
    pub created_at: u64,
    pub last_opened_at: Option<u64>,
}

impl Sheet {
    /// A fresh sheet owned by `owner` and holding exactly `first_grid`.
    pub fn new(id: Uuid, owner: Uuid, first_grid: Uuid) -> Self {
        Self {
            id,
            title: DEFAULT_SHEET_TITLE.to_string(),
            created_by: BTreeSet::from([owner]),
            grids: vec![first_grid],
            created_at: now_millis(),
            last_opened_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    pub id: Uuid,
    pub sheet_id: Uuid,
    pub title: String,
    pub color: String,
    pub created_by: Uuid,
    pub created_at: u64,
}

impl Grid {
    pub fn new(sheet_id: Uuid, created_by: Uuid, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sheet_id,
            title: title.into(),
            color: DEFAULT_GRID_COLOR.to_string(),
            created_by,
            created_at: now_millis(),
        }
    }
}

/// A positioned row strip inside a grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub id: Uuid,
    pub grid_id: Uuid,
    pub index: u32,
    /// Height in pixels; `None` uses the grid default.
    pub size: Option<u32>,
    pub hidden: bool,
}

impl Row {
    pub fn new(grid_id: Uuid, index: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            grid_id,
            index,
            size: None,
            hidden: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: Uuid,
    pub grid_id: Uuid,
    pub index: u32,
    /// Width in pixels; `None` uses the grid default.
    pub size: Option<u32>,
    pub hidden: bool,
}

impl Column {
    pub fn new(grid_id: Uuid, index: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            grid_id,
            index,
            size: None,
            hidden: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub id: Uuid,
    pub grid_id: Uuid,
    pub row_id: Uuid,
    pub column_id: Uuid,
    /// Raw value as typed; no format is imposed.
    pub content: String,
    pub updated_by: Option<Uuid>,
    pub updated_at: u64,
}

/// Sheet detail as returned to a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetDetail {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub title: String,
    pub grids: Vec<GridSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSummary {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub title: String,
    pub color: String,
    pub sheet_id: Uuid,
}

impl From<&Grid> for GridSummary {
    fn from(grid: &Grid) -> Self {
        Self {
            id: grid.id,
            title: grid.title.clone(),
            color: grid.color.clone(),
            sheet_id: grid.sheet_id,
        }
    }
}

/// List entry; membership is deliberately not exposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetSummary {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub title: String,
    pub grids: Vec<Uuid>,
    pub created_at: u64,
    pub last_opened_at: Option<u64>,
}

impl From<Sheet> for SheetSummary {
    fn from(sheet: Sheet) -> Self {
        Self {
            id: sheet.id,
            title: sheet.title,
            grids: sheet.grids,
            created_at: sheet.created_at,
            last_opened_at: sheet.last_opened_at,
        }
    }
}
