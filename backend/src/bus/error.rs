//! Bus error classification
//!
//! Failures reported by the RTI fall into two classes:
//! - **Transient**: the call may succeed if repeated (concurrent access,
//!   save or restore in progress). Retried with a fixed backoff.
//! - **Structural**: repeating the call cannot help (undefined class,
//!   federate no longer an execution member). Propagated to the caller.

use crate::models::interaction::ClassHandle;
use thiserror::Error;

/// Errors reported by an [`RtiBus`](crate::bus::RtiBus) implementation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BusError {
    #[error("Concurrent access to the RTI was attempted")]
    ConcurrentAccess,

    #[error("Federation save in progress")]
    SaveInProgress,

    #[error("Federation restore in progress")]
    RestoreInProgress,

    #[error("Interaction class not defined: {0}")]
    UndefinedClass(String),

    #[error("Interaction class handle not defined: {0}")]
    UndefinedHandle(ClassHandle),

    #[error("Federate is not a federation execution member")]
    NotExecutionMember,

    #[error("Federate not joined: {0}")]
    FederateNotJoined(String),

    #[error("Not connected to the RTI")]
    NotConnected,

    #[error("RTI internal error: {0}")]
    Internal(String),
}

impl BusError {
    /// True when repeating the call may succeed
    ///
    /// # Example
    /// ```
    /// use federation_manager_core_rs::bus::BusError;
    ///
    /// assert!(BusError::SaveInProgress.is_transient());
    /// assert!(!BusError::UndefinedClass("Ping".into()).is_transient());
    /// ```
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BusError::ConcurrentAccess | BusError::SaveInProgress | BusError::RestoreInProgress
        )
    }

    /// True for errors meaning this federate is no longer part of the federation
    pub fn is_membership(&self) -> bool {
        matches!(
            self,
            BusError::NotExecutionMember | BusError::FederateNotJoined(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_is_disjoint() {
        let all = [
            BusError::ConcurrentAccess,
            BusError::SaveInProgress,
            BusError::RestoreInProgress,
            BusError::UndefinedClass("X".to_string()),
            BusError::UndefinedHandle(ClassHandle(3)),
            BusError::NotExecutionMember,
            BusError::FederateNotJoined("fm".to_string()),
            BusError::NotConnected,
            BusError::Internal("boom".to_string()),
        ];
        for err in all {
            assert!(!(err.is_transient() && err.is_membership()), "{err}");
        }
    }
}
