//! Allow-list of API operations.
//!
//! Every authenticated route maps to exactly one operation, and every
//! operation names the single credential class allowed to call it.

use super::credentials::CredentialClass;
use axum::http::Method;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListSources,
    RecordSnapshot,
    DeleteSource,
    GetPolicy,
    SetPolicy,
    Status,
    Refresh,
    Shutdown,
}

impl Operation {
    pub fn resolve(method: &Method, path: &str) -> Option<Self> {
        let op = match (method.as_str(), path) {
            ("GET", "/api/v1/sources") => Self::ListSources,
            ("POST", "/api/v1/snapshots") => Self::RecordSnapshot,
            ("POST", "/api/v1/sources/delete") => Self::DeleteSource,
            ("GET", "/api/v1/policy") => Self::GetPolicy,
            ("PUT", "/api/v1/policy") => Self::SetPolicy,
            ("GET", "/api/v1/control/status") => Self::Status,
            ("POST", "/api/v1/control/refresh") => Self::Refresh,
            ("POST", "/api/v1/control/shutdown") => Self::Shutdown,
            _ => return None,
        };
        Some(op)
    }

    pub fn required_class(self) -> CredentialClass {
        match self {
            Self::ListSources
            | Self::RecordSnapshot
            | Self::DeleteSource
            | Self::GetPolicy
            | Self::SetPolicy => CredentialClass::Ordinary,
            Self::Status | Self::Refresh | Self::Shutdown => CredentialClass::Control,
        }
    }

    /// Ordinary operations that change state and therefore need a CSRF token.
    pub fn is_mutating(self) -> bool {
        matches!(self, Self::RecordSnapshot | Self::DeleteSource | Self::SetPolicy)
    }

    pub fn permits(self, class: CredentialClass) -> bool {
        self.required_class() == class
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ListSources => "list-sources",
            Self::RecordSnapshot => "record-snapshot",
            Self::DeleteSource => "delete-source",
            Self::GetPolicy => "get-policy",
            Self::SetPolicy => "set-policy",
            Self::Status => "status",
            Self::Refresh => "refresh",
            Self::Shutdown => "shutdown",
        }
    }
}
