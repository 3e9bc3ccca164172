//! Request/response adapter for a routing layer.
//!
//! Takes already-authenticated user ids and raw request values, calls the
//! lifecycle manager, and produces `{ data, message }` envelopes or classified
//! errors with an HTTP-style status.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ErrorKind, SheetError};
use crate::lifecycle::SheetService;
use crate::model::SheetDetail;
use crate::query::{ListQuery, SheetPage, SheetPatch};
use crate::store::EntityStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub message: String,
}

impl<T> ApiResponse<T> {
    fn with_data(data: T, message: &str) -> Self {
        Self { data: Some(data), message: message.to_string() }
    }
}

impl ApiResponse<()> {
    fn message(message: &str) -> Self {
        Self { data: None, message: message.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub status: u16,
    pub message: String,
}

impl From<SheetError> for ApiError {
    fn from(err: SheetError) -> Self {
        let kind = err.kind();
        let status = match kind {
            ErrorKind::NotFound => 404,
            ErrorKind::AccessDenied => 403,
            ErrorKind::AlreadyMember => 409,
            ErrorKind::Validation => 400,
            ErrorKind::Store => 500,
        };
        let message = match &err {
            SheetError::Store(inner) => {
                log::error!("Storage failure: {inner}");
                "Internal storage error".to_string()
            }
            other => other.to_string(),
        };
        Self { kind, status, message }
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSheet {
    pub sheet_id: Uuid,
}

fn parse_sheet_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| SheetError::Validation(format!("Invalid sheet id: {raw}")).into())
}

pub struct SheetApi<S> {
    sheets: SheetService<S>,
}

impl<S: EntityStore> SheetApi<S> {
    pub fn new(sheets: SheetService<S>) -> Self {
        Self { sheets }
    }

    pub fn store(&self) -> &Arc<S> {
        self.sheets.store()
    }

    pub fn create(&self, user_id: Uuid) -> ApiResult<CreatedSheet> {
        let sheet_id = self.sheets.create(user_id)?;
        Ok(ApiResponse::with_data(CreatedSheet { sheet_id }, "Sheet has been created successfully"))
    }

    pub fn detail(&self, user_id: Uuid, sheet_id: &str) -> ApiResult<SheetDetail> {
        let detail = self.sheets.get_by_id(user_id, parse_sheet_id(sheet_id)?)?;
        Ok(ApiResponse::with_data(detail, "Success"))
    }

    pub fn list(
        &self,
        user_id: Uuid,
        search: Option<&str>,
        page: Option<&str>,
        limit: Option<&str>,
    ) -> ApiResult<SheetPage> {
        let query = ListQuery::from_raw(search, page, limit);
        Ok(ApiResponse::with_data(self.sheets.list(user_id, &query)?, "Success"))
    }

    pub fn update(&self, user_id: Uuid, sheet_id: &str, body: serde_json::Value) -> ApiResult<()> {
        let sheet_id = parse_sheet_id(sheet_id)?;
        let patch = SheetPatch::from_json(body)?;
        self.sheets.update(user_id, sheet_id, patch)?;
        Ok(ApiResponse::message("Sheet has been updated successfully"))
    }

    pub fn remove(&self, user_id: Uuid, sheet_id: &str) -> ApiResult<()> {
        self.sheets.delete(user_id, parse_sheet_id(sheet_id)?)?;
        Ok(ApiResponse::message("Sheet has been deleted successfully"))
    }

    /// Sharing is reachable without an authenticated user.
    pub fn add_user(&self, sheet_id: &str, email: &str) -> ApiResult<()> {
        self.sheets.add_user_to_sheet(parse_sheet_id(sheet_id)?, email)?;
        Ok(ApiResponse::message("User has been successfully added to the sheet"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn api() -> SheetApi<MemoryStore> {
        SheetApi::new(SheetService::new(Arc::new(MemoryStore::new())))
    }

    #[test]
    fn test_create_envelope() {
        let api = api();
        let resp = api.create(Uuid::new_v4()).unwrap();
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["message"], "Sheet has been created successfully");
        assert!(json["data"]["sheetId"].is_string());
    }

    #[test]
    fn test_message_only_envelope_omits_data() {
        let api = api();
        let user = Uuid::new_v4();
        let id = api.create(user).unwrap().data.unwrap().sheet_id.to_string();

        let resp = api.update(user, &id, json!({ "title": "Plan" })).unwrap();
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["message"], "Sheet has been updated successfully");
    }

    #[test]
    fn test_error_statuses() {
        let api = api();
        let user = Uuid::new_v4();
        let id = api.create(user).unwrap().data.unwrap().sheet_id.to_string();

        let err = api.detail(Uuid::new_v4(), &id).unwrap_err();
        assert_eq!((err.kind, err.status), (ErrorKind::AccessDenied, 403));

        let err = api.detail(user, &Uuid::new_v4().to_string()).unwrap_err();
        assert_eq!((err.status, err.message.as_str()), (404, "Sheet does not exist"));

        let err = api.detail(user, "not-an-id").unwrap_err();
        assert_eq!(err.status, 400);

        let err = api.update(user, &id, json!({ "grids": [] })).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_list_coerces_query() {
        let api = api();
        let user = Uuid::new_v4();
        api.create(user).unwrap();

        let page = api.list(user, None, Some("x"), Some("y")).unwrap().data.unwrap();
        assert_eq!(page.page_meta.page, 1);
        assert_eq!(page.page_meta.total, 1);
        assert_eq!(page.sheets.len(), 1);
    }
}
