use thiserror::Error;

/// Run-level failures that end a reorganization. Each maps to a stable code
/// that is printed with the error and recorded in the audit log.
#[derive(Debug, Error)]
pub enum FolioError {
    #[error("another reorganization holds the lock (pid {pid}, since {started_at})")]
    Locked { pid: u32, started_at: String },
    #[error("content store unreachable: {0}")]
    StoreUnreachable(String),
    #[error("no artworks found to reorganize")]
    EmptyCatalog,
    #[error("catalog could not be saved; images were already published: {0}")]
    CatalogPersist(String),
    #[error("configuration invalid: {0}")]
    InvalidConfig(String),
    #[error("checkpoint conflict: {0}")]
    CheckpointConflict(String),
}

impl FolioError {
    pub fn code(&self) -> FolioErrorCode {
        match self {
            Self::Locked { .. } => FolioErrorCode::E001Locked,
            Self::StoreUnreachable(_) => FolioErrorCode::E002StoreUnreachable,
            Self::EmptyCatalog => FolioErrorCode::E003EmptyCatalog,
            Self::CatalogPersist(_) => FolioErrorCode::E004CatalogPersist,
            Self::InvalidConfig(_) => FolioErrorCode::E005ConfigInvalid,
            Self::CheckpointConflict(_) => FolioErrorCode::E006CheckpointConflict,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolioErrorCode {
    E001Locked,
    E002StoreUnreachable,
    E003EmptyCatalog,
    E004CatalogPersist,
    E005ConfigInvalid,
    E006CheckpointConflict,
}

impl FolioErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Locked => "E001_LOCKED",
            Self::E002StoreUnreachable => "E002_STORE_UNREACHABLE",
            Self::E003EmptyCatalog => "E003_EMPTY_CATALOG",
            Self::E004CatalogPersist => "E004_CATALOG_PERSIST",
            Self::E005ConfigInvalid => "E005_CONFIG_INVALID",
            Self::E006CheckpointConflict => "E006_CHECKPOINT_CONFLICT",
        }
    }
}
