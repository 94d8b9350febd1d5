use crate::forces::apply_pair;
use crate::types::NodeId;
use glam::DVec3;

/// A private per-worker accumulator of displacement per node.
///
/// The attraction phase partitions edges, not nodes, so two workers can hit
/// the same endpoint. Each worker therefore writes into its own
/// [`DisplacementBuffer`]; the buffers are reduced into the layout data once
/// every worker has finished.
///
/// Internally, `dx[i]` corresponds to node `i`, and `touched[i]` records
/// whether anything was added for it since the last clear.
#[derive(Debug, Clone)]
pub struct DisplacementBuffer {
    /// Accumulated displacement for each node.
    dx: Vec<DVec3>,
    /// Whether each node received at least one contribution.
    touched: Vec<bool>,
}

impl DisplacementBuffer {
    /// Creates a new [`DisplacementBuffer`] with the given length.
    ///
    /// All accumulated displacements are initialized to `DVec3::ZERO`.
    ///
    /// ### Parameters
    /// - `len` - Number of nodes this buffer can store displacements for.
    pub fn with_len(len: usize) -> Self {
        Self {
            dx: vec![DVec3::ZERO; len],
            touched: vec![false; len],
        }
    }

    /// Number of node slots.
    pub fn len(&self) -> usize {
        self.dx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dx.is_empty()
    }

    /// Ensures that the internal storage has exactly the given length.
    ///
    /// After this call all entries are cleared, even if the length was
    /// already correct.
    ///
    /// ### Parameters
    /// - `len` - Desired length of the internal buffers.
    pub fn ensure_len(&mut self, len: usize) {
        if self.dx.len() != len {
            self.dx.resize(len, DVec3::ZERO);
            self.touched.resize(len, false);
        }
        self.clear();
    }

    /// Clears all accumulated displacements, keeping the length.
    pub fn clear(&mut self) {
        self.dx.fill(DVec3::ZERO);
        self.touched.fill(false);
    }

    /// Adds one displacement contribution for the given node.
    ///
    /// ### Panics
    /// Panics if `id` is out of bounds.
    #[inline]
    pub fn add(&mut self, id: NodeId, d: DVec3) {
        self.dx[id] += d;
        self.touched[id] = true;
    }

    /// Accumulated displacement for a node (`DVec3::ZERO` if untouched).
    #[inline]
    pub fn get(&self, id: NodeId) -> DVec3 {
        self.dx[id]
    }

    /// Returns `true` if the node received any contribution.
    #[inline]
    pub fn is_touched(&self, id: NodeId) -> bool {
        self.touched[id]
    }

    /// Adds `d` for node `a` and its negation for node `b`.
    ///
    /// A pair with `a == b` cancels out and leaves the buffer untouched.
    ///
    /// ### Panics
    /// Panics if either id is out of bounds.
    #[inline]
    pub fn add_pair(&mut self, a: NodeId, b: NodeId, d: DVec3) {
        if a == b {
            return;
        }
        let (lo, hi) = (a.min(b), a.max(b));
        let (head, tail) = self.dx.split_at_mut(hi);
        let (da, db) = if a < b {
            (&mut head[lo], &mut tail[0])
        } else {
            (&mut tail[0], &mut head[lo])
        };
        apply_pair(d, da, db);
        self.touched[a] = true;
        self.touched[b] = true;
    }
}
