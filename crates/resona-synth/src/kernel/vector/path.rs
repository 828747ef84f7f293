//! Breakpoint path for the vector position.
//!
//! A path is up to [`MAX_PATH_POINTS`] points in the `[-1, 1]²` plane. Point
//! 0 is where the note starts; point `i` is reached `points[i].time` seconds
//! after point `i - 1`, moving linearly. With looping enabled, arriving at
//! `loop_end` jumps back to `loop_start` and the segments in between repeat
//! for as long as the note sounds. Without looping the path holds its last
//! point.

/// Maximum breakpoints per path.
pub const MAX_PATH_POINTS: usize = 16;

/// One breakpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PathPoint {
    /// Horizontal position (-1.0 to 1.0)
    pub x: f32,
    /// Vertical position (-1.0 to 1.0)
    pub y: f32,
    /// Seconds to travel here from the previous point
    pub time: f32,
}

impl PathPoint {
    /// Create a point, clamping coordinates and time.
    pub fn new(x: f32, y: f32, time: f32) -> Self {
        Self {
            x: x.clamp(-1.0, 1.0),
            y: y.clamp(-1.0, 1.0),
            time: time.clamp(0.0, 60.0),
        }
    }
}

/// Fixed-capacity breakpoint list with optional loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VectorPath {
    points: [PathPoint; MAX_PATH_POINTS],
    len: usize,
    loop_start: usize,
    loop_end: usize,
    looping: bool,
}

impl Default for VectorPath {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorPath {
    /// Empty path (the manual position is used).
    pub const fn new() -> Self {
        Self {
            points: [PathPoint {
                x: 0.0,
                y: 0.0,
                time: 0.0,
            }; MAX_PATH_POINTS],
            len: 0,
            loop_start: 0,
            loop_end: 0,
            looping: false,
        }
    }

    /// Build from points; extra points beyond the capacity are dropped.
    pub fn from_points(points: &[PathPoint]) -> Self {
        let mut path = Self::new();
        for &p in points.iter().take(MAX_PATH_POINTS) {
            path.push(p);
        }
        path
    }

    /// Append a point. Returns `false` when full.
    pub fn push(&mut self, point: PathPoint) -> bool {
        if self.len == MAX_PATH_POINTS {
            return false;
        }
        self.points[self.len] = PathPoint::new(point.x, point.y, point.time);
        self.len += 1;
        true
    }

    /// Remove all points.
    pub fn clear(&mut self) {
        self.len = 0;
        self.looping = false;
    }

    /// Active points.
    pub fn points(&self) -> &[PathPoint] {
        &self.points[..self.len]
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` when the path has no points.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Loop between two point indices. `start` must be below `end`;
    /// otherwise looping is disabled.
    pub fn set_loop(&mut self, start: usize, end: usize) {
        if start < end && end < self.len {
            self.loop_start = start;
            self.loop_end = end;
            self.looping = true;
        } else {
            self.looping = false;
        }
    }

    /// Disable looping.
    pub fn clear_loop(&mut self) {
        self.looping = false;
    }

    /// `(start, end)` when looping.
    pub fn loop_range(&self) -> Option<(usize, usize)> {
        self.looping.then_some((self.loop_start, self.loop_end))
    }

    /// Position of point 0, or the origin when empty.
    pub fn position_at_start(&self) -> (f32, f32) {
        self.points().first().map_or((0.0, 0.0), |p| (p.x, p.y))
    }
}

/// Per-voice playback cursor over a [`VectorPath`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathCursor {
    /// Index of the point being travelled towards
    target: usize,
    /// Seconds spent in the current segment
    elapsed: f32,
}

impl Default for PathCursor {
    fn default() -> Self {
        Self {
            target: 1,
            elapsed: 0.0,
        }
    }
}

impl PathCursor {
    /// Restart at point 0.
    pub fn reset(&mut self) {
        self.target = 1;
        self.elapsed = 0.0;
    }

    /// Advance by `dt` seconds and return the current position.
    pub fn advance(&mut self, path: &VectorPath, dt: f32) -> (f32, f32) {
        let len = path.len();
        if len == 0 {
            return (0.0, 0.0);
        }
        if len == 1 {
            return path.position_at_start();
        }
        let points = path.points();
        self.target = self.target.max(1);
        self.elapsed += dt;
        // Bounded by the point count so a loop of zero-time segments cannot spin.
        for _ in 0..=MAX_PATH_POINTS {
            if self.target >= len {
                let last = points[len - 1];
                return (last.x, last.y);
            }
            let seg_time = points[self.target].time;
            if self.elapsed < seg_time {
                break;
            }
            self.elapsed -= seg_time;
            if path.looping && self.target == path.loop_end {
                self.target = path.loop_start + 1;
            } else {
                self.target += 1;
            }
        }
        if self.target >= len {
            let last = points[len - 1];
            return (last.x, last.y);
        }
        let from = points[self.target - 1];
        let to = points[self.target];
        let seg_time = to.time;
        let t = if seg_time > 0.0 {
            (self.elapsed / seg_time).clamp(0.0, 1.0)
        } else {
            1.0
        };
        (from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_path() -> VectorPath {
        VectorPath::from_points(&[
            PathPoint::new(-1.0, -1.0, 0.0),
            PathPoint::new(1.0, -1.0, 1.0),
            PathPoint::new(1.0, 1.0, 1.0),
            PathPoint::new(-1.0, 1.0, 1.0),
        ])
    }

    #[test]
    fn test_linear_segment() {
        let path = square_path();
        let mut cursor = PathCursor::default();
        cursor.reset();
        let (x, y) = cursor.advance(&path, 0.5);
        assert!((x - 0.0).abs() < 1e-6);
        assert_eq!(y, -1.0);
        let (x, y) = cursor.advance(&path, 1.0);
        assert_eq!(x, 1.0);
        assert!((y - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_holds_last_point_without_loop() {
        let path = square_path();
        let mut cursor = PathCursor::default();
        cursor.reset();
        assert_eq!(cursor.advance(&path, 10.0), (-1.0, 1.0));
        assert_eq!(cursor.advance(&path, 1.0), (-1.0, 1.0));
    }

    #[test]
    fn test_loop_repeats_segments() {
        let mut path = square_path();
        path.set_loop(1, 3);
        let mut cursor = PathCursor::default();
        cursor.reset();
        // 1 s to point 1, then a 2 s loop between points 1 and 3.
        let first = cursor.advance(&path, 1.5);
        let again = cursor.advance(&path, 2.0);
        assert!((first.0 - again.0).abs() < 1e-5);
        assert!((first.1 - again.1).abs() < 1e-5);
        assert_eq!(path.loop_range(), Some((1, 3)));
    }

    #[test]
    fn test_invalid_loop_disabled() {
        let mut path = square_path();
        path.set_loop(2, 1);
        assert_eq!(path.loop_range(), None);
        path.set_loop(0, 9);
        assert_eq!(path.loop_range(), None);
    }

    #[test]
    fn test_zero_time_loop_terminates() {
        let mut path = VectorPath::from_points(&[
            PathPoint::new(0.0, 0.0, 0.0),
            PathPoint::new(0.5, 0.5, 0.0),
            PathPoint::new(-0.5, 0.5, 0.0),
        ]);
        path.set_loop(0, 2);
        let mut cursor = PathCursor::default();
        cursor.reset();
        let (x, y) = cursor.advance(&path, 0.1);
        assert!(x.is_finite() && y.is_finite());
    }

    #[test]
    fn test_capacity_and_clamping() {
        let mut path = VectorPath::new();
        for _ in 0..MAX_PATH_POINTS {
            assert!(path.push(PathPoint::new(3.0, -3.0, 100.0)));
        }
        assert!(!path.push(PathPoint::default()));
        assert_eq!(path.points()[0], PathPoint::new(1.0, -1.0, 60.0));
        assert_eq!(path.len(), MAX_PATH_POINTS);
    }
}
