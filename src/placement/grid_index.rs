use std::collections::HashSet;

use super::types::{GridEntryKey, ScreenBox};

/// A grid entry returned by range queries. Circles are reported by their
/// bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridEntry {
    pub key: GridEntryKey,
    pub bounds: ScreenBox,
}

/// Fixed-size spatial index over collision boxes and circles.
///
/// Coordinates outside `[0, width] x [0, height]` are clamped to the border
/// cells, so entries hanging off the grid are still found.
#[derive(Debug, Clone)]
pub struct GridIndex {
    width: f64,
    height: f64,
    x_cell_count: usize,
    y_cell_count: usize,
    x_scale: f64,
    y_scale: f64,
    /// Per cell, ids of boxes and circles touching it.
    box_cells: Vec<Vec<usize>>,
    circle_cells: Vec<Vec<usize>>,
    box_keys: Vec<GridEntryKey>,
    boxes: Vec<ScreenBox>,
    circle_keys: Vec<GridEntryKey>,
    circles: Vec<(f64, f64, f64)>,
}

/// Optional filter applied to candidate entries.
pub type GridPredicate<'a> = Option<&'a dyn Fn(&GridEntryKey) -> bool>;

fn accepts(predicate: GridPredicate<'_>, key: &GridEntryKey) -> bool {
    predicate.is_none_or(|predicate| predicate(key))
}

impl GridIndex {
    pub fn new(width: f64, height: f64, cell_size: f64) -> Self {
        let x_cell_count = ((width / cell_size).ceil() as usize).max(1);
        let y_cell_count = ((height / cell_size).ceil() as usize).max(1);
        let cells = x_cell_count * y_cell_count;
        Self {
            width,
            height,
            x_cell_count,
            y_cell_count,
            x_scale: x_cell_count as f64 / width,
            y_scale: y_cell_count as f64 / height,
            box_cells: vec![Vec::new(); cells],
            circle_cells: vec![Vec::new(); cells],
            box_keys: Vec::new(),
            boxes: Vec::new(),
            circle_keys: Vec::new(),
            circles: Vec::new(),
        }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn keys_len(&self) -> usize {
        self.box_keys.len() + self.circle_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys_len() == 0
    }

    pub fn insert(&mut self, key: GridEntryKey, x1: f64, y1: f64, x2: f64, y2: f64) {
        let uid = self.boxes.len();
        for cell in self.cell_range(x1, y1, x2, y2) {
            self.box_cells[cell].push(uid);
        }
        self.box_keys.push(key);
        self.boxes.push(ScreenBox::new(x1, y1, x2, y2));
    }

    /// Circles are filed under every cell of their bounding square.
    pub fn insert_circle(&mut self, key: GridEntryKey, x: f64, y: f64, radius: f64) {
        let uid = self.circles.len();
        for cell in self.cell_range(x - radius, y - radius, x + radius, y + radius) {
            self.circle_cells[cell].push(uid);
        }
        self.circle_keys.push(key);
        self.circles.push((x, y, radius));
    }

    /// Every entry whose shape touches the box.
    pub fn query(&self, x1: f64, y1: f64, x2: f64, y2: f64, predicate: GridPredicate<'_>) -> Vec<GridEntry> {
        let mut result = Vec::new();
        if x2 < 0.0 || x1 > self.width || y2 < 0.0 || y1 > self.height {
            return result;
        }
        if x1 <= 0.0 && y1 <= 0.0 && self.width <= x2 && self.height <= y2 {
            // The query covers the whole grid.
            result.extend(self.all_entries().filter(|entry| accepts(predicate, &entry.key)));
            return result;
        }
        self.scan_box(x1, y1, x2, y2, predicate, |entry| {
            result.push(entry);
            false
        });
        result
    }

    /// Whether any entry touches the box.
    pub fn hit_test(&self, x1: f64, y1: f64, x2: f64, y2: f64, predicate: GridPredicate<'_>) -> bool {
        if x2 < 0.0 || x1 > self.width || y2 < 0.0 || y1 > self.height {
            return false;
        }
        if x1 <= 0.0 && y1 <= 0.0 && self.width <= x2 && self.height <= y2 {
            return self.all_entries().any(|entry| accepts(predicate, &entry.key));
        }
        let mut hit = false;
        self.scan_box(x1, y1, x2, y2, predicate, |_| {
            hit = true;
            true
        });
        hit
    }

    /// Whether any entry touches the circle.
    pub fn hit_test_circle(&self, x: f64, y: f64, radius: f64, predicate: GridPredicate<'_>) -> bool {
        let (x1, y1, x2, y2) = (x - radius, y - radius, x + radius, y + radius);
        if x2 < 0.0 || x1 > self.width || y2 < 0.0 || y1 > self.height {
            return false;
        }
        let mut seen_boxes = HashSet::new();
        let mut seen_circles = HashSet::new();
        for cell in self.cell_range(x1, y1, x2, y2) {
            for &uid in &self.box_cells[cell] {
                if !seen_boxes.insert(uid) {
                    continue;
                }
                let b = &self.boxes[uid];
                if circle_and_rect_collide(x, y, radius, b.x1, b.y1, b.x2, b.y2)
                    && accepts(predicate, &self.box_keys[uid])
                {
                    return true;
                }
            }
            for &uid in &self.circle_cells[cell] {
                if !seen_circles.insert(uid) {
                    continue;
                }
                let (cx, cy, cr) = self.circles[uid];
                if circles_collide(cx, cy, cr, x, y, radius) && accepts(predicate, &self.circle_keys[uid]) {
                    return true;
                }
            }
        }
        false
    }

    fn all_entries(&self) -> impl Iterator<Item = GridEntry> + '_ {
        let boxes = self
            .box_keys
            .iter()
            .zip(&self.boxes)
            .map(|(key, bounds)| GridEntry { key: *key, bounds: *bounds });
        let circles = self.circle_keys.iter().zip(&self.circles).map(|(key, &(x, y, r))| GridEntry {
            key: *key,
            bounds: ScreenBox::new(x - r, y - r, x + r, y + r),
        });
        boxes.chain(circles)
    }

    /// Visits matching entries cell by cell, each at most once, until
    /// `visit` returns true.
    fn scan_box(
        &self,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        predicate: GridPredicate<'_>,
        mut visit: impl FnMut(GridEntry) -> bool,
    ) {
        let mut seen_boxes = HashSet::new();
        let mut seen_circles = HashSet::new();
        for cell in self.cell_range(x1, y1, x2, y2) {
            for &uid in &self.box_cells[cell] {
                if !seen_boxes.insert(uid) {
                    continue;
                }
                let b = self.boxes[uid];
                let key = self.box_keys[uid];
                if x1 <= b.x2 && y1 <= b.y2 && x2 >= b.x1 && y2 >= b.y1 && accepts(predicate, &key) {
                    if visit(GridEntry { key, bounds: b }) {
                        return;
                    }
                }
            }
            for &uid in &self.circle_cells[cell] {
                if !seen_circles.insert(uid) {
                    continue;
                }
                let (cx, cy, cr) = self.circles[uid];
                let key = self.circle_keys[uid];
                if circle_and_rect_collide(cx, cy, cr, x1, y1, x2, y2) && accepts(predicate, &key) {
                    let bounds = ScreenBox::new(cx - cr, cy - cr, cx + cr, cy + cr);
                    if visit(GridEntry { key, bounds }) {
                        return;
                    }
                }
            }
        }
    }

    fn cell_range(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> impl Iterator<Item = usize> + use<> {
        let cx1 = self.x_cell_coord(x1);
        let cy1 = self.y_cell_coord(y1);
        let cx2 = self.x_cell_coord(x2);
        let cy2 = self.y_cell_coord(y2);
        let stride = self.x_cell_count;
        (cx1..=cx2).flat_map(move |x| (cy1..=cy2).map(move |y| stride * y + x))
    }

    fn x_cell_coord(&self, x: f64) -> usize {
        ((x * self.x_scale).floor().max(0.0) as usize).min(self.x_cell_count - 1)
    }

    fn y_cell_coord(&self, y: f64) -> usize {
        ((y * self.y_scale).floor().max(0.0) as usize).min(self.y_cell_count - 1)
    }
}

fn circles_collide(x1: f64, y1: f64, r1: f64, x2: f64, y2: f64, r2: f64) -> bool {
    let dx = x2 - x1;
    let dy = y2 - y1;
    let both_radii = r1 + r2;
    both_radii * both_radii > dx * dx + dy * dy
}

fn circle_and_rect_collide(circle_x: f64, circle_y: f64, radius: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> bool {
    let half_width = (x2 - x1) / 2.0;
    let dist_x = (circle_x - (x1 + half_width)).abs();
    if dist_x > half_width + radius {
        return false;
    }
    let half_height = (y2 - y1) / 2.0;
    let dist_y = (circle_y - (y1 + half_height)).abs();
    if dist_y > half_height + radius {
        return false;
    }
    if dist_x <= half_width || dist_y <= half_height {
        return true;
    }
    let dx = dist_x - half_width;
    let dy = dist_y - half_height;
    dx * dx + dy * dy <= radius * radius
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(feature_index: u32) -> GridEntryKey {
        GridEntryKey {
            bucket_instance_id: 1,
            feature_index,
            collision_group_id: 0,
        }
    }

    #[test]
    fn boxes_hit_overlapping_queries() {
        let mut grid = GridIndex::new(100.0, 100.0, 10.0);
        grid.insert(key(0), 10.0, 10.0, 20.0, 20.0);
        assert!(grid.hit_test(15.0, 15.0, 30.0, 30.0, None));
        assert!(grid.hit_test(20.0, 20.0, 30.0, 30.0, None));
        assert!(!grid.hit_test(21.0, 21.0, 30.0, 30.0, None));
    }

    #[test]
    fn circles_and_boxes_collide_both_ways() {
        let mut grid = GridIndex::new(100.0, 100.0, 10.0);
        grid.insert_circle(key(0), 50.0, 50.0, 5.0);
        assert!(grid.hit_test(54.0, 40.0, 60.0, 60.0, None));
        // Corner of the box is outside the circle's radius.
        assert!(!grid.hit_test(54.0, 54.0, 60.0, 60.0, None));
        assert!(grid.hit_test_circle(58.0, 50.0, 4.0, None));
        assert!(!grid.hit_test_circle(60.0, 50.0, 4.0, None));
    }

    #[test]
    fn predicate_filters_entries() {
        let mut grid = GridIndex::new(100.0, 100.0, 10.0);
        grid.insert(key(3), 0.0, 0.0, 10.0, 10.0);
        let only_seven = |k: &GridEntryKey| k.feature_index == 7;
        assert!(!grid.hit_test(0.0, 0.0, 5.0, 5.0, Some(&only_seven)));
        assert!(grid.hit_test(0.0, 0.0, 5.0, 5.0, None));
    }

    #[test]
    fn query_returns_each_entry_once() {
        let mut grid = GridIndex::new(100.0, 100.0, 10.0);
        grid.insert(key(0), 5.0, 5.0, 45.0, 45.0);
        grid.insert_circle(key(1), 60.0, 60.0, 15.0);
        let found = grid.query(0.0, 0.0, 70.0, 70.0, None);
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].bounds, ScreenBox::new(45.0, 45.0, 75.0, 75.0));
    }

    #[test]
    fn whole_grid_query_returns_everything() {
        let mut grid = GridIndex::new(100.0, 100.0, 10.0);
        grid.insert(key(0), 5.0, 5.0, 6.0, 6.0);
        grid.insert(key(1), 90.0, 90.0, 95.0, 95.0);
        assert_eq!(grid.query(-1.0, -1.0, 200.0, 200.0, None).len(), 2);
        assert!(grid.hit_test(-1.0, -1.0, 200.0, 200.0, None));
    }

    #[test]
    fn entries_off_the_edge_are_clamped_into_border_cells() {
        let mut grid = GridIndex::new(100.0, 100.0, 10.0);
        grid.insert(key(0), -30.0, -30.0, 2.0, 2.0);
        assert!(grid.hit_test(0.0, 0.0, 1.0, 1.0, None));
        assert!(!grid.hit_test(-50.0, -50.0, -40.0, -40.0, None));
    }
}
