use kurbo::Rect;
use smallvec::SmallVec;

/// An axis-aligned rectangle in integer device coordinates.
///
/// Half-open on both axes: a point `(x, y)` is inside when
/// `x0 <= x < x1 && y0 <= y < y1`. Any rectangle with a non-positive extent
/// on either axis is treated as empty.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub struct DeviceRect {
    /// Left edge.
    pub x0: i32,
    /// Top edge.
    pub y0: i32,
    /// Right edge (exclusive).
    pub x1: i32,
    /// Bottom edge (exclusive).
    pub y1: i32,
}

/// Up to four disjoint rectangles, as produced by [`DeviceRect::subtract`].
pub type RectSet = SmallVec<[DeviceRect; 4]>;

impl DeviceRect {
    /// The canonical empty rectangle.
    pub const EMPTY: Self = Self {
        x0: 0,
        y0: 0,
        x1: 0,
        y1: 0,
    };

    /// A rectangle large enough to contain any practical device surface.
    ///
    /// Kept at half the `i32` range so translation and inflation cannot
    /// overflow.
    pub const INFINITE: Self = Self {
        x0: i32::MIN / 2,
        y0: i32::MIN / 2,
        x1: i32::MAX / 2,
        y1: i32::MAX / 2,
    };

    /// Construct from edges.
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Construct from an origin and a size.
    pub const fn from_origin_size(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self {
            x0: x,
            y0: y,
            x1: x.saturating_add(w),
            y1: y.saturating_add(h),
        }
    }

    /// Convert a float rectangle to device coordinates by rounding each edge
    /// to the nearest integer, clamping into `i32` range.
    pub fn from_rect_rounded(r: Rect) -> Self {
        fn round_coord(v: f64) -> i32 {
            if v.is_nan() {
                return 0;
            }
            v.round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
        }

        Self {
            x0: round_coord(r.x0),
            y0: round_coord(r.y0),
            x1: round_coord(r.x1),
            y1: round_coord(r.y1),
        }
    }

    /// Convert to a float rectangle.
    pub fn to_rect(self) -> Rect {
        Rect::new(
            f64::from(self.x0),
            f64::from(self.y0),
            f64::from(self.x1),
            f64::from(self.y1),
        )
    }

    /// Width, zero when empty.
    pub fn width(self) -> i32 {
        (self.x1 - self.x0).max(0)
    }

    /// Height, zero when empty.
    pub fn height(self) -> i32 {
        (self.y1 - self.y0).max(0)
    }

    /// True when the rectangle contains no points.
    pub fn is_empty(self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }

    /// Intersection; empty rectangles propagate.
    pub fn intersect(self, other: Self) -> Self {
        let r = Self {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        };
        if r.is_empty() { Self::EMPTY } else { r }
    }

    /// True when the two rectangles share at least one point.
    pub fn intersects(self, other: Self) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Smallest rectangle containing both operands. Empty operands are
    /// ignored.
    pub fn union(self, other: Self) -> Self {
        if self.is_empty() {
            return if other.is_empty() { Self::EMPTY } else { other };
        }
        if other.is_empty() {
            return self;
        }
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// True when `other` lies entirely inside `self`. Every rectangle
    /// contains the empty rectangle.
    pub fn contains_rect(self, other: Self) -> bool {
        if other.is_empty() {
            return true;
        }
        self.x0 <= other.x0 && self.y0 <= other.y0 && self.x1 >= other.x1 && self.y1 >= other.y1
    }

    /// True when the point is inside the half-open extents.
    pub fn contains_point(self, x: i32, y: i32) -> bool {
        self.x0 <= x && x < self.x1 && self.y0 <= y && y < self.y1
    }

    /// Translate by `(dx, dy)` with saturating arithmetic.
    pub fn translate(self, dx: i32, dy: i32) -> Self {
        Self {
            x0: self.x0.saturating_add(dx),
            y0: self.y0.saturating_add(dy),
            x1: self.x1.saturating_add(dx),
            y1: self.y1.saturating_add(dy),
        }
    }

    /// Grow every edge outward by `margin` (shrink when negative), with
    /// saturating arithmetic. Empty rectangles stay empty.
    pub fn inflate(self, margin: i32) -> Self {
        if self.is_empty() {
            return Self::EMPTY;
        }
        let r = Self {
            x0: self.x0.saturating_sub(margin),
            y0: self.y0.saturating_sub(margin),
            x1: self.x1.saturating_add(margin),
            y1: self.y1.saturating_add(margin),
        };
        if r.is_empty() { Self::EMPTY } else { r }
    }

    /// Decompose `self − inner` into at most four disjoint rectangles.
    ///
    /// Band order is fixed: top band across the full outer width, bottom
    /// band across the full outer width, then left and right bands spanning
    /// only the inner rectangle's vertical overlap. The outer edges
    /// therefore always win at the corners when the two rectangles overlap
    /// on more than one edge.
    pub fn subtract(self, inner: Self) -> RectSet {
        let mut out = RectSet::new();
        if self.is_empty() {
            return out;
        }
        let inner = self.intersect(inner);
        if inner.is_empty() {
            out.push(self);
            return out;
        }

        if inner.y0 > self.y0 {
            out.push(Self::new(self.x0, self.y0, self.x1, inner.y0));
        }
        if inner.y1 < self.y1 {
            out.push(Self::new(self.x0, inner.y1, self.x1, self.y1));
        }
        if inner.x0 > self.x0 {
            out.push(Self::new(self.x0, inner.y0, inner.x0, inner.y1));
        }
        if inner.x1 < self.x1 {
            out.push(Self::new(inner.x1, inner.y0, self.x1, inner.y1));
        }
        out
    }
}
