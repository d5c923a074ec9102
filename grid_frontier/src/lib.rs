use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::VecDeque;

/// A min-heap of nodes keyed by an `f64` priority.
///
/// `std::collections::BinaryHeap` is a max-heap over `Ord` keys, so entries
/// flip the comparison and order floats with `total_cmp`. Duplicate nodes are
/// allowed; callers that re-push a node with a fresher priority are expected
/// to detect and discard stale pops themselves.
pub struct MinFrontier<N> {
    heap: BinaryHeap<Entry<N>>,
}

/// Helper struct for the priority queue.
struct Entry<N> {
    node: N,
    priority: f64,
}

impl<N> PartialEq for Entry<N> {
    fn eq(&self, other: &Self) -> bool {
        self.priority.total_cmp(&other.priority) == Ordering::Equal
    }
}

impl<N> Eq for Entry<N> {}

impl<N> Ord for Entry<N> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering so the smallest priority pops first.
        other.priority.total_cmp(&self.priority)
    }
}

impl<N> PartialOrd for Entry<N> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<N> MinFrontier<N> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, node: N, priority: f64) {
        self.heap.push(Entry { node, priority });
    }

    /// Pop the entry with the lowest priority.
    pub fn pop(&mut self) -> Option<(N, f64)> {
        self.heap.pop().map(|e| (e.node, e.priority))
    }

    /// Priority of the next entry to pop, if any.
    pub fn peek_priority(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.priority)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl<N> Default for MinFrontier<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// A reusable visited-set over a dense index space.
///
/// Clearing is O(1): each slot stores the generation it was last marked in,
/// and `reset` bumps the current generation so every old mark becomes stale.
/// When the generation counter would overflow, the marks are zeroed and the
/// counter restarts, so correctness never depends on the counter wrapping.
#[derive(Default)]
pub struct GenerationalVisited {
    marks: Vec<u32>,
    generation: u32,
}

impl GenerationalVisited {
    pub fn new(len: usize) -> Self {
        Self {
            marks: vec![0; len],
            generation: 1,
        }
    }

    /// Number of tracked indices.
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Forget all marks without touching the backing storage.
    pub fn reset(&mut self) {
        if self.generation == u32::MAX {
            self.marks.fill(0);
            self.generation = 1;
        } else {
            self.generation += 1;
        }
    }

    /// Mark `index` as visited. Returns `true` if this is the first visit
    /// since the last `reset`.
    pub fn visit(&mut self, index: usize) -> bool {
        if self.marks[index] == self.generation {
            false
        } else {
            self.marks[index] = self.generation;
            true
        }
    }

    pub fn is_visited(&self, index: usize) -> bool {
        self.marks[index] == self.generation
    }

    /// Grow or shrink the tracked index space. New slots start unvisited.
    pub fn resize(&mut self, len: usize) {
        self.marks.resize(len, 0);
    }

    #[cfg(test)]
    fn force_generation(&mut self, generation: u32) {
        self.generation = generation;
    }
}

/// A breadth-first distance field sampled at every `stride`-th grid point.
///
/// The lattice keeps one distance per coarse point, measured in coarse steps
/// from the start. Lookups snap an arbitrary fine coordinate to the nearest
/// coarse point, clamped to the last valid coarse index rather than the raw
/// grid bound, so border coordinates on grids whose size is not a multiple
/// of the stride still resolve.
pub struct CoarseLattice {
    stride: u32,
    cols: u32,
    rows: u32,
    /// `u32::MAX` marks a coarse point the search never reached.
    distances: Vec<u32>,
}

const UNREACHED: u32 = u32::MAX;

impl CoarseLattice {
    /// Flood the lattice from `start` (fine coordinates), walking between
    /// adjacent coarse points whose fine position satisfies `passable`.
    ///
    /// The start point itself is always seeded even if `passable` rejects
    /// it, so a search rooted just off a legal cell still expands.
    pub fn build<F>(width: u32, height: u32, stride: u32, start: (u32, u32), passable: F) -> Self
    where
        F: Fn(u32, u32) -> bool,
    {
        assert!(stride >= 1, "stride must be at least 1");
        assert!(width >= 1 && height >= 1, "lattice needs a non-empty grid");
        let cols = (width - 1) / stride + 1;
        let rows = (height - 1) / stride + 1;
        let mut distances = vec![UNREACHED; (cols * rows) as usize];

        let sx = nearest_coarse(start.0, stride, cols);
        let sy = nearest_coarse(start.1, stride, rows);
        distances[(sy * cols + sx) as usize] = 0;

        let mut queue = VecDeque::new();
        queue.push_back((sx, sy));
        while let Some((cx, cy)) = queue.pop_front() {
            let here = distances[(cy * cols + cx) as usize];
            let mut relax = |nx: u32, ny: u32| {
                let slot = (ny * cols + nx) as usize;
                if distances[slot] == UNREACHED && passable(nx * stride, ny * stride) {
                    distances[slot] = here + 1;
                    queue.push_back((nx, ny));
                }
            };
            if cx > 0 {
                relax(cx - 1, cy);
            }
            if cx + 1 < cols {
                relax(cx + 1, cy);
            }
            if cy > 0 {
                relax(cx, cy - 1);
            }
            if cy + 1 < rows {
                relax(cx, cy + 1);
            }
        }

        Self {
            stride,
            cols,
            rows,
            distances,
        }
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Distance from the start to the coarse point nearest `(x, y)`, in
    /// coarse steps. `None` if that point was never reached.
    pub fn distance_steps(&self, x: u32, y: u32) -> Option<u32> {
        let cx = nearest_coarse(x, self.stride, self.cols);
        let cy = nearest_coarse(y, self.stride, self.rows);
        let d = self.distances[(cy * self.cols + cx) as usize];
        if d == UNREACHED { None } else { Some(d) }
    }
}

/// Snap a fine coordinate to its nearest coarse index, clamped into the
/// lattice.
fn nearest_coarse(v: u32, stride: u32, extent: u32) -> u32 {
    ((v + stride / 2) / stride).min(extent - 1)
}
