//! Single-level ownership check: a user may touch a sheet iff they are a member.

use uuid::Uuid;

use crate::error::SheetError;
use crate::model::Sheet;

pub fn can_access(user_id: Uuid, sheet: &Sheet) -> bool {
    sheet.created_by.contains(&user_id)
}

pub fn require_access(user_id: Uuid, sheet: &Sheet) -> Result<(), SheetError> {
    if can_access(user_id, sheet) {
        Ok(())
    } else {
        Err(SheetError::AccessDenied { sheet_id: sheet.id, user_id })
    }
}
