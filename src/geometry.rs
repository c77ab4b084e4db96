// Screen-space geometry helpers used by collision detection and picking.
// All functions work with pure geometry.

use glam::DVec2;

fn orientation(a: DVec2, b: DVec2, c: DVec2) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn point_on_segment(point: DVec2, a: DVec2, b: DVec2, eps: f64) -> bool {
    point.x >= a.x.min(b.x) - eps
        && point.x <= a.x.max(b.x) + eps
        && point.y >= a.y.min(b.y) - eps
        && point.y <= a.y.max(b.y) + eps
}

pub fn segments_intersect(a: DVec2, b: DVec2, c: DVec2, d: DVec2) -> bool {
    let eps = 1e-9;
    let o1 = orientation(a, b, c);
    let o2 = orientation(a, b, d);
    let o3 = orientation(c, d, a);
    let o4 = orientation(c, d, b);
    let crosses = ((o1 > eps && o2 < -eps) || (o1 < -eps && o2 > eps))
        && ((o3 > eps && o4 < -eps) || (o3 < -eps && o4 > eps));
    if crosses {
        return true;
    }
    if o1.abs() <= eps && point_on_segment(c, a, b, eps) {
        return true;
    }
    if o2.abs() <= eps && point_on_segment(d, a, b, eps) {
        return true;
    }
    if o3.abs() <= eps && point_on_segment(a, c, d, eps) {
        return true;
    }
    if o4.abs() <= eps && point_on_segment(b, c, d, eps) {
        return true;
    }
    false
}

/// Even-odd point in polygon test. The ring may be open or closed.
pub fn polygon_contains_point(ring: &[DVec2], p: DVec2) -> bool {
    let mut inside = false;
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let p1 = ring[i];
        let p2 = ring[j];
        if (p1.y > p.y) != (p2.y > p.y) && p.x < (p2.x - p1.x) * (p.y - p1.y) / (p2.y - p1.y) + p1.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn ring_edges(ring: &[DVec2]) -> impl Iterator<Item = (DVec2, DVec2)> + '_ {
    ring.iter()
        .zip(ring.iter().cycle().skip(1))
        .take(ring.len())
        .map(|(a, b)| (*a, *b))
}

/// True when two simple polygons overlap or touch. A single-point or
/// two-point "polygon" is handled as a point or a segment.
pub fn polygon_intersects_polygon(a: &[DVec2], b: &[DVec2]) -> bool {
    if a.iter().any(|p| polygon_contains_point(b, *p)) {
        return true;
    }
    if b.iter().any(|p| polygon_contains_point(a, *p)) {
        return true;
    }
    if a.len() == 1 && b.len() == 1 {
        return a[0] == b[0];
    }
    ring_edges(a).any(|(a0, a1)| ring_edges(b).any(|(b0, b1)| segments_intersect(a0, a1, b0, b1)))
}

/// Box corners in ring order.
pub fn box_ring(x1: f64, y1: f64, x2: f64, y2: f64) -> [DVec2; 4] {
    [
        DVec2::new(x1, y1),
        DVec2::new(x2, y1),
        DVec2::new(x2, y2),
        DVec2::new(x1, y2),
    ]
}

/// Clip a polyline against an axis-aligned rectangle, returning the
/// visible pieces in path order.
pub fn clip_line(line: &[DVec2], x1: f64, y1: f64, x2: f64, y2: f64) -> Vec<Vec<DVec2>> {
    let mut clipped: Vec<Vec<DVec2>> = Vec::new();
    for pair in line.windows(2) {
        let mut p0 = pair[0];
        let mut p1 = pair[1];

        if p0.x < x1 && p1.x < x1 {
            continue;
        } else if p0.x < x1 {
            p0 = DVec2::new(x1, p0.y + (p1.y - p0.y) * ((x1 - p0.x) / (p1.x - p0.x)));
        } else if p1.x < x1 {
            p1 = DVec2::new(x1, p0.y + (p1.y - p0.y) * ((x1 - p0.x) / (p1.x - p0.x)));
        }

        if p0.y < y1 && p1.y < y1 {
            continue;
        } else if p0.y < y1 {
            p0 = DVec2::new(p0.x + (p1.x - p0.x) * ((y1 - p0.y) / (p1.y - p0.y)), y1);
        } else if p1.y < y1 {
            p1 = DVec2::new(p0.x + (p1.x - p0.x) * ((y1 - p0.y) / (p1.y - p0.y)), y1);
        }

        if p0.x >= x2 && p1.x >= x2 {
            continue;
        } else if p0.x >= x2 {
            p0 = DVec2::new(x2, p0.y + (p1.y - p0.y) * ((x2 - p0.x) / (p1.x - p0.x)));
        } else if p1.x >= x2 {
            p1 = DVec2::new(x2, p0.y + (p1.y - p0.y) * ((x2 - p0.x) / (p1.x - p0.x)));
        }

        if p0.y >= y2 && p1.y >= y2 {
            continue;
        } else if p0.y >= y2 {
            p0 = DVec2::new(p0.x + (p1.x - p0.x) * ((y2 - p0.y) / (p1.y - p0.y)), y2);
        } else if p1.y >= y2 {
            p1 = DVec2::new(p0.x + (p1.x - p0.x) * ((y2 - p0.y) / (p1.y - p0.y)), y2);
        }

        match clipped.last_mut() {
            Some(current) if current.last() == Some(&p0) => current.push(p1),
            _ => clipped.push(vec![p0, p1]),
        }
    }
    clipped
}

/// Arc-length parameterization of a polyline with symmetric end padding.
#[derive(Debug, Clone, Default)]
pub struct PathInterpolator {
    points: Vec<DVec2>,
    distances: Vec<f64>,
    pub length: f64,
    pub padding: f64,
    pub padded_length: f64,
}

impl PathInterpolator {
    pub fn new(points: Vec<DVec2>, padding: f64) -> Self {
        let mut interpolator = Self::default();
        interpolator.reset(points, padding);
        interpolator
    }

    pub fn reset(&mut self, points: Vec<DVec2>, padding: f64) {
        self.distances.clear();
        self.distances.push(0.0);
        for i in 1..points.len() {
            let d = self.distances[i - 1] + points[i].distance(points[i - 1]);
            self.distances.push(d);
        }
        self.points = points;
        self.length = self.distances.last().copied().unwrap_or(0.0);
        self.padding = padding.min(self.length * 0.5);
        self.padded_length = self.length - self.padding * 2.0;
    }

    /// Point at fraction `t` of the padded length.
    pub fn lerp(&self, t: f64) -> DVec2 {
        debug_assert!(!self.points.is_empty(), "interpolating an empty path");
        if self.points.len() <= 1 {
            return self.points.first().copied().unwrap_or(DVec2::ZERO);
        }
        let t = t.clamp(0.0, 1.0);
        let target = t * self.padded_length + self.padding;
        let last = self.distances.len() - 1;
        let mut current = 1;
        while current < last && self.distances[current] < target {
            current += 1;
        }
        let prev = current - 1;
        let segment_length = self.distances[current] - self.distances[prev];
        let segment_t = if segment_length > 0.0 {
            (target - self.distances[prev]) / segment_length
        } else {
            0.0
        };
        self.points[prev].lerp(self.points[current], segment_t)
    }
}
