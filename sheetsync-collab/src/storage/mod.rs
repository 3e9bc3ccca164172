//! Persistent storage for the spreadsheet tree.
//!
//! ```text
//! ┌──────────────┐   EntityStore   ┌──────────────┐
//! │ SheetService │ ──────────────► │ RocksStore   │
//! │ GridService  │                 │ (RocksDB)    │
//! └──────────────┘                 └──────┬───────┘
//!                                         │ column families
//!                     ┌───────────────────┴──────────────────┐
//!                     │ users, user_emails, sheets, grids     │
//!                     │ rows, columns, cells (grid-prefixed)  │
//!                     │ parents (child id → grid id)          │
//!                     └──────────────────────────────────────┘
//! ```

pub mod rocks;

pub use rocks::{RocksStore, StoreConfig};
