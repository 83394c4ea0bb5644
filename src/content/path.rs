//! Path construction for content streams.
//!
//! PDF paths are constructed using a sequence of operators:
//! - `m` (MoveTo): Begin a new subpath
//! - `l` (LineTo): Add a line segment
//! - `c`, `v`, `y` (CurveTo variants): Add Bezier curve segments
//! - `re` (Rectangle): Add a rectangle as a complete subpath
//! - `h` (ClosePath): Close the current subpath
//!
//! Points are transformed by the CTM in effect when each operator runs, so
//! a finished [`Path`] is already in page space.

use crate::content::graphics_state::Matrix;
use crate::geometry::{Point, Rect};

/// Fill rule for fill and clip operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindingRule {
    /// Non-zero winding number rule (`f`, `F`, `B`, `b`, `W`)
    #[default]
    NonZero,
    /// Even-odd rule (`f*`, `B*`, `b*`, `W*`)
    EvenOdd,
}

/// A single path segment in page space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSegment {
    /// Start a subpath
    MoveTo(Point),
    /// Straight line from the current point
    LineTo(Point),
    /// Cubic Bezier curve: two control points, then the end point
    CurveTo(Point, Point, Point),
    /// Close the current subpath
    Close,
}

/// A path under construction or ready to paint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    segments: Vec<PathSegment>,
    /// Current point (set by MoveTo, LineTo, CurveTo, etc.)
    current_point: Option<Point>,
    /// Start point of current subpath (for ClosePath)
    subpath_start: Option<Point>,
}

/// A clip entry: path plus the rule deciding its interior.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipPath {
    /// Clip outline in page space
    pub path: Path,
    /// Interior rule
    pub rule: WindingRule,
}

impl Path {
    /// Create an empty path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Closed rectangle path, already in page space.
    pub fn from_rect(rect: &Rect) -> Self {
        let mut path = Path::new();
        path.rectangle(rect.x, rect.y, rect.width, rect.height, &Matrix::identity());
        path
    }

    /// Closed path through `corners` in order.
    pub fn from_polygon(corners: &[Point]) -> Self {
        let mut path = Path::new();
        let mut iter = corners.iter();
        if let Some(first) = iter.next() {
            path.push_move(*first);
            for p in iter {
                path.segments.push(PathSegment::LineTo(*p));
            }
            path.close_path();
        }
        path
    }

    /// Segments in construction order.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Check if no segment has been added.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Current point, if a subpath is open.
    pub fn current_point(&self) -> Option<Point> {
        self.current_point
    }

    fn push_move(&mut self, point: Point) {
        self.segments.push(PathSegment::MoveTo(point));
        self.current_point = Some(point);
        self.subpath_start = Some(point);
    }

    /// Move to a point (`m`).
    pub fn move_to(&mut self, x: f32, y: f32, ctm: &Matrix) {
        self.push_move(ctm.transform_point(x, y));
    }

    /// Line to a point (`l`). Returns `false` without a current point.
    pub fn line_to(&mut self, x: f32, y: f32, ctm: &Matrix) -> bool {
        if self.current_point.is_none() {
            return false;
        }
        let point = ctm.transform_point(x, y);
        self.segments.push(PathSegment::LineTo(point));
        self.current_point = Some(point);
        true
    }

    /// Cubic Bezier curve (`c`). Returns `false` without a current point.
    #[allow(clippy::too_many_arguments)]
    pub fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x3: f32, y3: f32, ctm: &Matrix) -> bool {
        if self.current_point.is_none() {
            return false;
        }
        let p1 = ctm.transform_point(x1, y1);
        let p2 = ctm.transform_point(x2, y2);
        let p3 = ctm.transform_point(x3, y3);
        self.segments.push(PathSegment::CurveTo(p1, p2, p3));
        self.current_point = Some(p3);
        true
    }

    /// Curve whose first control point is the current point (`v`).
    pub fn curve_to_v(&mut self, x2: f32, y2: f32, x3: f32, y3: f32, ctm: &Matrix) -> bool {
        let Some(p1) = self.current_point else {
            return false;
        };
        let p2 = ctm.transform_point(x2, y2);
        let p3 = ctm.transform_point(x3, y3);
        self.segments.push(PathSegment::CurveTo(p1, p2, p3));
        self.current_point = Some(p3);
        true
    }

    /// Curve whose second control point is the end point (`y`).
    pub fn curve_to_y(&mut self, x1: f32, y1: f32, x3: f32, y3: f32, ctm: &Matrix) -> bool {
        if self.current_point.is_none() {
            return false;
        }
        let p1 = ctm.transform_point(x1, y1);
        let p3 = ctm.transform_point(x3, y3);
        self.segments.push(PathSegment::CurveTo(p1, p3, p3));
        self.current_point = Some(p3);
        true
    }

    /// Rectangle (`re`): moveto, three linetos and a close.
    pub fn rectangle(&mut self, x: f32, y: f32, width: f32, height: f32, ctm: &Matrix) {
        let p0 = ctm.transform_point(x, y);
        self.push_move(p0);
        self.segments.push(PathSegment::LineTo(ctm.transform_point(x + width, y)));
        self.segments.push(PathSegment::LineTo(ctm.transform_point(x + width, y + height)));
        self.segments.push(PathSegment::LineTo(ctm.transform_point(x, y + height)));
        self.segments.push(PathSegment::Close);
        self.current_point = Some(p0);
    }

    /// Close the current subpath (`h`). Returns `false` without a subpath.
    pub fn close_path(&mut self) -> bool {
        let Some(start) = self.subpath_start else {
            return false;
        };
        self.segments.push(PathSegment::Close);
        self.current_point = Some(start);
        true
    }

    /// Take the finished path, leaving this one empty.
    pub fn take(&mut self) -> Path {
        std::mem::take(self)
    }

    /// Every point the path passes through, control points included.
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        self.segments.iter().flat_map(|segment| {
            let points: Vec<Point> = match *segment {
                PathSegment::MoveTo(p) | PathSegment::LineTo(p) => vec![p],
                PathSegment::CurveTo(p1, p2, p3) => vec![p1, p2, p3],
                PathSegment::Close => Vec::new(),
            };
            points
        })
    }

    /// Bounding box of all points, control points included.
    pub fn bounds(&self) -> Option<Rect> {
        Rect::bounding(self.points())
    }

    /// The same path mapped through `matrix`.
    pub fn transformed(&self, matrix: &Matrix) -> Path {
        let map = |p: Point| matrix.transform_point(p.x, p.y);
        Path {
            segments: self
                .segments
                .iter()
                .map(|segment| match *segment {
                    PathSegment::MoveTo(p) => PathSegment::MoveTo(map(p)),
                    PathSegment::LineTo(p) => PathSegment::LineTo(map(p)),
                    PathSegment::CurveTo(p1, p2, p3) => PathSegment::CurveTo(map(p1), map(p2), map(p3)),
                    PathSegment::Close => PathSegment::Close,
                })
                .collect(),
            current_point: self.current_point.map(map),
            subpath_start: self.subpath_start.map(map),
        }
    }
}
