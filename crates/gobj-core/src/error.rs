//! Error types for the object runtime

use thiserror::Error;

use crate::{DataType, GObjId};

/// Core runtime errors
///
/// A declared event with no transition in the current state is not an
/// error: it is reported as `Dispatch::NotHandled`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GObjError {
    // Registry errors
    #[error("GClass not registered: {0}")]
    UnknownClass(String),

    #[error("GClass ALREADY registered: {0}")]
    DuplicateClass(String),

    #[error("Invalid gclass {gclass}: {reason}")]
    InvalidClass { gclass: String, reason: String },

    #[error("GClass {gclass} has {instances} live instances")]
    ClassInUse { gclass: String, instances: usize },

    #[error("GClass {0} is singleton and already has an instance")]
    SingletonViolation(String),

    // Dispatch errors
    #[error("Event NOT DEFINED in gclass {gclass}: {event}")]
    UnknownEvent { gclass: String, event: String },

    #[error("State NOT DEFINED in gclass {gclass}: {state}")]
    UnknownState { gclass: String, state: String },

    #[error("Dispatch to destroyed gobj {0}")]
    DestroyedTarget(GObjId),

    #[error("Dispatch depth exceeded: {0}")]
    DispatchDepthExceeded(usize),

    // Attribute errors
    #[error("GClass Attribute NOT FOUND: {0}")]
    UnknownAttribute(String),

    #[error("Attribute {attr}: expected {expected}, got {actual}")]
    TypeMismatch {
        attr: String,
        expected: DataType,
        actual: String,
    },

    #[error("Required attribute not set: {0}")]
    RequiredMissing(String),

    // Naming and hierarchy errors
    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Name already used in this scope: {0}")]
    DuplicateName(String),

    #[error("Service ALREADY registered: {0}")]
    DuplicateService(String),

    #[error("Cannot make {child} a descendant of itself")]
    HierarchyCycle { child: GObjId },

    #[error("{child} is not a child of {parent}")]
    NotAChild { parent: GObjId, child: GObjId },

    #[error("{child} already has parent {parent}")]
    AlreadyLinked { parent: GObjId, child: GObjId },

    #[error("GObj disabled: {0}")]
    Disabled(GObjId),

    #[error("GObj not running: {0}")]
    NotRunning(GObjId),

    #[error("Subscription to {event} rejected by publisher {publisher}")]
    SubscriptionRejected { publisher: GObjId, event: String },

    // Collaborator errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid tree config: {0}")]
    InvalidTree(String),
}

impl GObjError {
    /// Defects are programming errors: logged at error level by the core.
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            GObjError::UnknownClass(_)
                | GObjError::DuplicateClass(_)
                | GObjError::InvalidClass { .. }
                | GObjError::UnknownEvent { .. }
                | GObjError::UnknownState { .. }
        )
    }
}

/// Result type for runtime operations
pub type GObjResult<T> = Result<T, GObjError>;
