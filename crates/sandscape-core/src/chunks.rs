//! Chunk bookkeeping for the sparse scheduler.
//!
//! The grid is partitioned into `chunk_size` squares (edge chunks may be
//! partial). Each chunk carries three flags: `active` (scan it next tick),
//! `touched` (some cell inside was written since the current tick began) and
//! `changed` (some cell inside was written since the last render drain).

use serde::{Deserialize, Serialize};

/// Chunk position in chunk units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub cx: u32,
    pub cy: u32,
}

/// Half-open cell rectangle covered by one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkBounds {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

#[derive(Debug, Clone)]
pub struct ChunkMap {
    chunk_size: u32,
    cols: u32,
    rows: u32,
    width: u32,
    height: u32,
    active: Vec<bool>,
    touched: Vec<bool>,
    changed: Vec<bool>,
}

impl ChunkMap {
    /// Partition a `width` x `height` grid. Every chunk starts active so the
    /// first tick settles whatever the scene was seeded with.
    #[must_use]
    pub fn new(width: u32, height: u32, chunk_size: u32) -> Self {
        let chunk_size = chunk_size.max(1);
        let cols = width.div_ceil(chunk_size);
        let rows = height.div_ceil(chunk_size);
        let len = (cols as usize) * (rows as usize);
        Self {
            chunk_size,
            cols,
            rows,
            width,
            height,
            active: vec![true; len],
            touched: vec![true; len],
            changed: vec![true; len],
        }
    }

    #[must_use]
    pub const fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    #[must_use]
    pub const fn cols(&self) -> u32 {
        self.cols
    }

    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Flat chunk index for an in-bounds cell.
    #[inline]
    #[must_use]
    pub fn chunk_of(&self, x: i32, y: i32) -> usize {
        let cx = x as u32 / self.chunk_size;
        let cy = y as u32 / self.chunk_size;
        self.index(cx, cy)
    }

    #[inline]
    #[must_use]
    pub const fn index(&self, cx: u32, cy: u32) -> usize {
        (cy as usize) * (self.cols as usize) + cx as usize
    }

    #[must_use]
    pub const fn coord(&self, index: usize) -> ChunkCoord {
        ChunkCoord {
            cx: (index % self.cols as usize) as u32,
            cy: (index / self.cols as usize) as u32,
        }
    }

    /// Cell rectangle of a chunk, clipped to the grid.
    #[must_use]
    pub fn bounds(&self, index: usize) -> ChunkBounds {
        let ChunkCoord { cx, cy } = self.coord(index);
        let x0 = cx * self.chunk_size;
        let y0 = cy * self.chunk_size;
        ChunkBounds {
            x0: x0 as i32,
            y0: y0 as i32,
            x1: (x0 + self.chunk_size).min(self.width) as i32,
            y1: (y0 + self.chunk_size).min(self.height) as i32,
        }
    }

    /// Orthogonal neighbours of a chunk in (up, down, left, right) order.
    pub fn neighbors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        let ChunkCoord { cx, cy } = self.coord(index);
        let candidates = [
            (cy > 0).then(|| (cx, cy - 1)),
            (cy + 1 < self.rows).then(|| (cx, cy + 1)),
            (cx > 0).then(|| (cx - 1, cy)),
            (cx + 1 < self.cols).then(|| (cx + 1, cy)),
        ];
        candidates
            .into_iter()
            .flatten()
            .map(move |(cx, cy)| self.index(cx, cy))
    }

    /// Schedule the chunk holding `(x, y)` and flag it as changed.
    #[inline]
    pub fn touch(&mut self, x: i32, y: i32) {
        let index = self.chunk_of(x, y);
        self.active[index] = true;
        self.touched[index] = true;
        self.changed[index] = true;
    }

    /// Schedule a chunk for the next tick without flagging a change.
    #[inline]
    pub fn wake(&mut self, index: usize) {
        self.active[index] = true;
    }

    #[inline]
    #[must_use]
    pub fn is_active(&self, index: usize) -> bool {
        self.active[index]
    }

    #[must_use]
    pub fn is_changed(&self, index: usize) -> bool {
        self.changed[index]
    }

    /// Schedule and flag every chunk (after imports and bulk edits).
    pub fn activate_all(&mut self) {
        self.active.fill(true);
        self.touched.fill(true);
        self.changed.fill(true);
    }

    /// Copy the live set into `scheduled` and the chunks written since the
    /// previous tick into `touched`, then clear both for this tick.
    pub fn begin_tick(&mut self, scheduled: &mut Vec<bool>, touched: &mut Vec<bool>) {
        scheduled.clear();
        scheduled.extend_from_slice(&self.active);
        self.active.fill(false);
        touched.clear();
        touched.extend_from_slice(&self.touched);
        self.touched.fill(false);
    }

    /// Flat indices of the scheduled chunks, for snapshots.
    #[must_use]
    pub fn active_indices(&self) -> Vec<u32> {
        indices(&self.active)
    }

    /// Flat indices of chunks written since the current tick began.
    #[must_use]
    pub fn touched_indices(&self) -> Vec<u32> {
        indices(&self.touched)
    }

    /// Replace the live set with `indices`; out-of-range entries are ignored.
    pub fn restore_active(&mut self, indices: &[u32]) {
        restore_flags(&mut self.active, indices);
        self.changed.fill(true);
    }

    /// Replace the written-this-tick set with `indices`.
    pub fn restore_touched(&mut self, indices: &[u32]) {
        restore_flags(&mut self.touched, indices);
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&on| on).count()
    }

    #[must_use]
    pub fn active_chunks(&self) -> Vec<ChunkCoord> {
        self.collect(&self.active)
    }

    #[must_use]
    pub fn changed_chunks(&self) -> Vec<ChunkCoord> {
        self.collect(&self.changed)
    }

    /// Drain the changed set, returning the chunks that were flagged.
    pub fn take_changed(&mut self) -> Vec<ChunkCoord> {
        let changed = self.collect(&self.changed);
        self.changed.fill(false);
        changed
    }

    fn collect(&self, flags: &[bool]) -> Vec<ChunkCoord> {
        flags
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(index, _)| self.coord(index))
            .collect()
    }
}

fn indices(flags: &[bool]) -> Vec<u32> {
    flags
        .iter()
        .enumerate()
        .filter(|(_, on)| **on)
        .map(|(index, _)| index as u32)
        .collect()
}

fn restore_flags(flags: &mut [bool], indices: &[u32]) {
    flags.fill(false);
    for &index in indices {
        if let Some(flag) = flags.get_mut(index as usize) {
            *flag = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_edge_chunks_are_clipped() {
        let map = ChunkMap::new(20, 10, 8);
        assert_eq!((map.cols(), map.rows()), (3, 2));
        assert_eq!(map.chunk_of(19, 9), map.index(2, 1));
        let last = map.bounds(map.index(2, 1));
        assert_eq!(
            last,
            ChunkBounds {
                x0: 16,
                y0: 8,
                x1: 20,
                y1: 10
            }
        );
    }

    #[test]
    fn neighbors_stay_inside_the_map() {
        let map = ChunkMap::new(16, 16, 4);
        let corner: Vec<_> = map.neighbors(0).collect();
        assert_eq!(corner, vec![map.index(0, 1), map.index(1, 0)]);
        assert_eq!(map.neighbors(map.index(1, 1)).count(), 4);
    }

    #[test]
    fn begin_tick_snapshots_and_clears() {
        let mut map = ChunkMap::new(8, 8, 4);
        let (mut scheduled, mut touched) = (Vec::new(), Vec::new());
        map.begin_tick(&mut scheduled, &mut touched);
        assert!(scheduled.iter().all(|&on| on));
        assert!(touched.iter().all(|&on| on));
        assert_eq!(map.active_count(), 0);
        assert!(map.touched_indices().is_empty());

        map.touch(5, 1);
        assert_eq!(map.active_chunks(), vec![ChunkCoord { cx: 1, cy: 0 }]);
        assert_eq!(map.touched_indices(), vec![1]);
        assert!(map.is_changed(map.index(1, 0)));

        map.wake(2);
        map.begin_tick(&mut scheduled, &mut touched);
        assert_eq!(scheduled, [false, true, true, false]);
        assert_eq!(touched, [false, true, false, false]);
    }

    #[test]
    fn take_changed_drains() {
        let mut map = ChunkMap::new(8, 8, 4);
        assert_eq!(map.take_changed().len(), 4);
        assert!(map.changed_chunks().is_empty());
        map.wake(3);
        assert!(map.changed_chunks().is_empty());
        map.touch(0, 7);
        assert_eq!(map.take_changed(), vec![ChunkCoord { cx: 0, cy: 1 }]);
    }
}
