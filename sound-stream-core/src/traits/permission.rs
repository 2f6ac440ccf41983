use std::sync::atomic::{AtomicBool, Ordering};

/// Source of truth for microphone access.
///
/// The grant flow itself (system dialogs, settings) belongs to the host.
pub trait PermissionProvider: Send + Sync {
    /// Whether microphone access is currently granted.
    fn has_permission(&self) -> bool;

    /// Ask for access and return the outcome.
    ///
    /// Implementations that cannot prompt synchronously report the current state.
    fn request_permission(&self) -> bool {
        self.has_permission()
    }
}

/// Fixed permission answer, toggleable at runtime.
#[derive(Debug)]
pub struct StaticPermission {
    granted: AtomicBool,
}

impl StaticPermission {
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
        }
    }

    pub fn granted() -> Self {
        Self::new(true)
    }

    pub fn denied() -> Self {
        Self::new(false)
    }

    pub fn set(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }
}

impl PermissionProvider for StaticPermission {
    fn has_permission(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }
}
