//! Reserved property key constants.
//!
//! Avoid string typos, enable IDE autocomplete.
//! Usage: `attrs.get_or(K_TARGETNAME, "")`

/// Entity class (reserved; resolved via `Attrs::classname`)
pub const K_CLASSNAME: &str = "classname";
/// Entity position as "x y z"
pub const K_ORIGIN: &str = "origin";
/// Behavior flags bitfield
pub const K_SPAWNFLAGS: &str = "spawnflags";
/// Name other entities target
pub const K_TARGETNAME: &str = "targetname";
/// Entity this one targets
pub const K_TARGET: &str = "target";
/// Yaw angle in degrees
pub const K_ANGLE: &str = "angle";
