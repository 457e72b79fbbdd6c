//! Common utilities and types shared across the waypoint core
pub mod error;
pub mod geometry;
pub mod messages;

pub use self::error::CoreError;

/// Common types and utilities used across the codebase
pub mod types {
    /// A position in the shared planar map frame (z is carried but mostly flat)
    pub type Point = nalgebra::Point3<f64>;

    /// Vehicle or waypoint orientation
    pub type Orientation = nalgebra::UnitQuaternion<f64>;

    /// A stop-line coordinate (x, y)
    pub type StopLine = (f64, f64);

    /// Index into the base path, or none when no stop is required
    pub type StopIndex = Option<usize>;
}
