pub use kurbo::{Affine, Point, Rect, Vec2};

/// Straight-alpha RGBA8 color, used for clear colors and color keys.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub struct Rgba8 {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl Rgba8 {
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    /// Fully opaque black.
    pub const BLACK: Self = Self {
        r: 0,
        g: 0,
        b: 0,
        a: 255,
    };
}

/// A point in integer device coordinates.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub struct DevicePoint {
    /// Horizontal coordinate.
    pub x: i32,
    /// Vertical coordinate.
    pub y: i32,
}

impl DevicePoint {
    /// Construct from coordinates.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An integer translation between coordinate spaces.
///
/// A device's offset maps compositor-space coordinates into its local space
/// by subtraction: `local = compositor - offset`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub struct DeviceVec {
    /// Horizontal component.
    pub x: i32,
    /// Vertical component.
    pub y: i32,
}

impl DeviceVec {
    /// The zero translation.
    pub const ZERO: Self = Self { x: 0, y: 0 };

    /// Construct from components.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// True when both components are zero.
    pub fn is_zero(self) -> bool {
        self.x == 0 && self.y == 0
    }
}
