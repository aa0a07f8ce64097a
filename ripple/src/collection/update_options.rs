/// Options for [update_with_options](crate::collection::Collection::update_with_options).
///
/// ```rust
/// use ripple::collection::{insert_if_absent, just_once, UpdateOptions};
///
/// assert!(just_once().is_just_once());
/// assert!(insert_if_absent().is_insert_if_absent());
/// assert!(!UpdateOptions::default().is_just_once());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    insert_if_absent: bool,
    just_once: bool,
}

impl UpdateOptions {
    pub fn new(insert_if_absent: bool, just_once: bool) -> Self {
        Self {
            insert_if_absent,
            just_once,
        }
    }

    /// When nothing matches, insert a document built from the selector's
    /// literal equalities with the modifier applied.
    pub fn is_insert_if_absent(&self) -> bool {
        self.insert_if_absent
    }

    /// Update only the first match in insertion order.
    pub fn is_just_once(&self) -> bool {
        self.just_once
    }
}

/// Upsert options.
pub fn insert_if_absent() -> UpdateOptions {
    UpdateOptions::new(true, false)
}

/// Options updating only the first match.
pub fn just_once() -> UpdateOptions {
    UpdateOptions::new(false, true)
}
