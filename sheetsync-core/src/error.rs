use thiserror::Error;
use uuid::Uuid;

/// Entity store failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Duplicate record: {0}")]
    Conflict(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Classification of a lifecycle failure, independent of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    AlreadyMember,
    Validation,
    Store,
}

/// Errors surfaced by the lifecycle manager and grid wrappers.
#[derive(Error, Debug)]
pub enum SheetError {
    #[error("{message}")]
    NotFound { message: &'static str, id: Option<Uuid> },
    #[error("You don't have access to view and edit the sheet")]
    AccessDenied { sheet_id: Uuid, user_id: Uuid },
    #[error("User already has access to this sheet")]
    AlreadyMember { sheet_id: Uuid, user_id: Uuid },
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SheetError {
    pub(crate) fn sheet_missing(id: Uuid) -> Self {
        SheetError::NotFound { message: "Sheet does not exist", id: Some(id) }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SheetError::NotFound { .. } => ErrorKind::NotFound,
            SheetError::AccessDenied { .. } => ErrorKind::AccessDenied,
            SheetError::AlreadyMember { .. } => ErrorKind::AlreadyMember,
            SheetError::Validation(_) => ErrorKind::Validation,
            SheetError::Store(_) => ErrorKind::Store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_match_client_strings() {
        let id = Uuid::new_v4();
        assert_eq!(SheetError::sheet_missing(id).to_string(), "Sheet does not exist");
        assert_eq!(
            SheetError::AccessDenied { sheet_id: id, user_id: id }.to_string(),
            "You don't have access to view and edit the sheet"
        );
        assert_eq!(
            SheetError::AlreadyMember { sheet_id: id, user_id: id }.to_string(),
            "User already has access to this sheet"
        );
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err: SheetError = StoreError::Database("disk full".into()).into();
        assert_eq!(err.kind(), ErrorKind::Store);
        assert_eq!(err.to_string(), "Database error: disk full");
    }
}
