//! Crate-wide defaults and sentinels.

/// Classname reported for entities that have no `classname` property.
/// Never empty: collaborators (outliner, property grid) can always render it.
pub const NO_CLASSNAME: &str = "unknown";

/// Half-extent of the icon box used to pick brushless (point) entities.
pub const ICON_HALF_EXTENT: f32 = 8.0;

/// Maximum events held in the deferred bus queue before oldest are evicted.
pub const MAX_EVENT_QUEUE: usize = 1000;
