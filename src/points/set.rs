use std::collections::HashSet;

use crate::foundation::core::SamplePoint;

/// Ordered, deduplicated collection of sampled points with undo/redo editing.
///
/// This is the manual-editing companion of the engine, deliberately kept
/// outside of it: the only interface between the two is
/// [`PointSet::snapshot`], which hands the engine the current point list.
/// Deduplication uses the integer pixel key; the first point to claim a pixel
/// wins.
#[derive(Clone, Debug, Default)]
pub struct PointSet {
    points: Vec<SamplePoint>,
    keys: HashSet<(i32, i32)>,
    undo: Vec<EditOp>,
    redo: Vec<EditOp>,
}

#[derive(Clone, Debug)]
enum EditOp {
    Insert { point: SamplePoint },
    Remove { point: SamplePoint, index: usize },
    /// Holds the list the edit replaced; undo/redo toggle by swapping.
    Replace { other: Vec<SamplePoint> },
}

impl PointSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Return `true` when the set holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The points in insertion order.
    pub fn points(&self) -> &[SamplePoint] {
        &self.points
    }

    /// Owned copy of the current point list, for handing to the engine.
    pub fn snapshot(&self) -> Vec<SamplePoint> {
        self.points.clone()
    }

    /// Return `true` when a point already claims the pixel.
    pub fn contains(&self, key: (i32, i32)) -> bool {
        self.keys.contains(&key)
    }

    /// Insert a point; returns `false` when its pixel is already taken.
    pub fn insert(&mut self, point: SamplePoint) -> bool {
        if !self.keys.insert(point.pixel_key()) {
            return false;
        }
        self.points.push(point);
        self.push_op(EditOp::Insert { point });
        true
    }

    /// Remove the point claiming a pixel; returns `false` when none does.
    pub fn remove(&mut self, key: (i32, i32)) -> bool {
        let Some(index) = self.points.iter().position(|p| p.pixel_key() == key) else {
            return false;
        };
        let point = self.points.remove(index);
        self.keys.remove(&key);
        self.push_op(EditOp::Remove { point, index });
        true
    }

    /// Replace the whole list, deduplicating on the pixel key.
    pub fn replace_all(&mut self, points: impl IntoIterator<Item = SamplePoint>) {
        let mut keys = HashSet::new();
        let next: Vec<SamplePoint> = points
            .into_iter()
            .filter(|p| keys.insert(p.pixel_key()))
            .collect();
        let previous = std::mem::replace(&mut self.points, next);
        self.keys = keys;
        self.push_op(EditOp::Replace { other: previous });
    }

    /// Undo the most recent edit; returns `false` when nothing is left to
    /// undo.
    pub fn undo(&mut self) -> bool {
        let Some(mut op) = self.undo.pop() else {
            return false;
        };
        self.invert(&mut op);
        self.redo.push(op);
        true
    }

    /// Redo the most recently undone edit; returns `false` when nothing is
    /// left to redo.
    pub fn redo(&mut self) -> bool {
        let Some(mut op) = self.redo.pop() else {
            return false;
        };
        self.invert(&mut op);
        self.undo.push(op);
        true
    }

    fn push_op(&mut self, op: EditOp) {
        self.undo.push(op);
        self.redo.clear();
    }

    /// Toggle an edit: applying `invert` twice restores the starting state,
    /// which is what lets one op move back and forth between the stacks.
    fn invert(&mut self, op: &mut EditOp) {
        match op {
            EditOp::Insert { point } => {
                let key = point.pixel_key();
                if self.keys.remove(&key) {
                    self.points.retain(|p| p.pixel_key() != key);
                    *op = EditOp::Remove {
                        point: *point,
                        index: self.points.len(),
                    };
                }
            }
            EditOp::Remove { point, index } => {
                let at = (*index).min(self.points.len());
                self.points.insert(at, *point);
                self.keys.insert(point.pixel_key());
                *op = EditOp::Insert { point: *point };
            }
            EditOp::Replace { other } => {
                std::mem::swap(&mut self.points, other);
                self.keys = self.points.iter().map(|p| p.pixel_key()).collect();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(set: &PointSet) -> Vec<(i32, i32)> {
        set.points().iter().map(|p| p.pixel_key()).collect()
    }

    #[test]
    fn insert_deduplicates_and_preserves_order() {
        let mut set = PointSet::new();
        assert!(set.insert(SamplePoint::from_pixel(1, 1)));
        assert!(set.insert(SamplePoint::from_pixel(2, 2)));
        assert!(!set.insert(SamplePoint::new(1.2, 0.8)));
        assert_eq!(keys(&set), vec![(1, 1), (2, 2)]);
        assert!(set.contains((2, 2)));
    }

    #[test]
    fn undo_redo_round_trips_inserts_and_removes() {
        let mut set = PointSet::new();
        set.insert(SamplePoint::from_pixel(1, 1));
        set.insert(SamplePoint::from_pixel(2, 2));
        set.remove((1, 1));
        assert_eq!(keys(&set), vec![(2, 2)]);

        assert!(set.undo());
        assert_eq!(keys(&set), vec![(1, 1), (2, 2)]);
        assert!(set.undo());
        assert_eq!(keys(&set), vec![(1, 1)]);
        assert!(set.redo());
        assert_eq!(keys(&set), vec![(1, 1), (2, 2)]);
        assert!(set.redo());
        assert_eq!(keys(&set), vec![(2, 2)]);
        assert!(!set.redo());
    }

    #[test]
    fn remove_restores_at_the_original_index() {
        let mut set = PointSet::new();
        for i in 0..3 {
            set.insert(SamplePoint::from_pixel(i, 0));
        }
        set.remove((1, 0));
        set.undo();
        assert_eq!(keys(&set), vec![(0, 0), (1, 0), (2, 0)]);
    }

    #[test]
    fn replace_all_toggles_through_undo_and_redo() {
        let mut set = PointSet::new();
        set.insert(SamplePoint::from_pixel(9, 9));
        set.replace_all([
            SamplePoint::from_pixel(1, 1),
            SamplePoint::from_pixel(1, 1),
            SamplePoint::from_pixel(3, 3),
        ]);
        assert_eq!(keys(&set), vec![(1, 1), (3, 3)]);

        assert!(set.undo());
        assert_eq!(keys(&set), vec![(9, 9)]);
        assert!(set.redo());
        assert_eq!(keys(&set), vec![(1, 1), (3, 3)]);
    }

    #[test]
    fn a_new_edit_clears_the_redo_stack() {
        let mut set = PointSet::new();
        set.insert(SamplePoint::from_pixel(1, 1));
        set.undo();
        set.insert(SamplePoint::from_pixel(2, 2));
        assert!(!set.redo());
        assert_eq!(keys(&set), vec![(2, 2)]);
    }
}
