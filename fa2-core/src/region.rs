//! Barnes-Hut region tree.
//!
//! Regions live in a flat arena and reference their members as a contiguous
//! slice of one shared node-index array, which is partitioned in place while
//! the tree is built. Children of a region are contiguous in the arena too,
//! so a region only stores two ranges.
//!
//! The top `split_rounds` levels are split one level at a time; every region
//! left on that frontier then grows its own subtree on a worker, into a
//! private arena that is spliced into the main one afterwards.

use crate::config::Dimensions;
use crate::error::Result;
use crate::forces::{Body, Repulsion};
use crate::pool::{Phase, WorkerPool};
use crate::types::{NodeId, RegionId};
use glam::DVec3;
use std::ops::Range;
use tracing::debug;

#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    /// First index into [`RegionTree::order`] of this region's members.
    pub start: usize,
    /// One past the last member index.
    pub end: usize,
    /// Arena indices of the children. Empty for a leaf.
    pub children: Range<RegionId>,
    pub mass: f64,
    /// Mass-weighted center of the members.
    pub center: DVec3,
    /// Twice the largest member distance to `center`.
    pub size: f64,
}

impl Region {
    fn from_members(start: usize, end: usize, bodies: &[Body], members: &[NodeId]) -> Self {
        let mut region = Self {
            start,
            end,
            children: 0..0,
            mass: 0.0,
            center: DVec3::ZERO,
            size: 0.0,
        };
        region.aggregate(bodies, members);
        region
    }

    /// Recomputes mass, center and size from the current member positions.
    fn aggregate(&mut self, bodies: &[Body], members: &[NodeId]) {
        let mut mass = 0.0;
        let mut weighted = DVec3::ZERO;
        for &id in members {
            let b = &bodies[id];
            mass += b.mass;
            weighted += b.position * b.mass;
        }
        let center = if mass > 0.0 {
            weighted / mass
        } else {
            DVec3::ZERO
        };
        self.size = members
            .iter()
            .map(|&id| 2.0 * (bodies[id].position - center).length())
            .fold(0.0, f64::max);
        self.mass = mass;
        self.center = center;
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct RegionTree {
    regions: Vec<Region>,
    order: Vec<NodeId>,
}

impl RegionTree {
    /// Builds the tree over every body. Region 0 is the root.
    ///
    /// ### Parameters
    /// - `bodies` - One entry per node, indexed by [`NodeId`].
    /// - `dims` - Selects quad-tree or oct-tree splitting.
    /// - `split_rounds` - Levels split before subtrees are handed to workers.
    /// - `pool` - Pool that grows the frontier subtrees.
    pub fn build(
        bodies: &[Body],
        dims: Dimensions,
        split_rounds: usize,
        pool: &WorkerPool,
    ) -> Result<Self> {
        let mut tree = RegionTree {
            regions: Vec::new(),
            order: (0..bodies.len()).collect(),
        };
        if bodies.is_empty() {
            return Ok(tree);
        }
        tree.regions
            .push(Region::from_members(0, bodies.len(), bodies, &tree.order));

        let mut builder = Builder::new(bodies, dims);
        let mut frontier: Vec<RegionId> = vec![0];
        for _ in 0..split_rounds {
            let mut next = Vec::new();
            for id in frontier {
                if tree.regions[id].len() > 1 {
                    next.extend(builder.split(&mut tree.regions, &mut tree.order, 0, id));
                }
            }
            frontier = next;
        }
        frontier.retain(|&id| tree.regions[id].len() > 1);
        frontier.sort_by_key(|&id| tree.regions[id].start);

        let mut jobs = Vec::with_capacity(frontier.len());
        let mut rest: &mut [NodeId] = &mut tree.order[..];
        let mut cursor = 0;
        for &id in &frontier {
            let r = &tree.regions[id];
            let (_, tail) = std::mem::take(&mut rest).split_at_mut(r.start - cursor);
            let (members, tail) = tail.split_at_mut(r.len());
            rest = tail;
            cursor = r.end;
            jobs.push(Subtree {
                root: id,
                base: r.start,
                order: members,
                regions: vec![r.clone()],
            });
        }

        pool.for_each_chunk(Phase::Tree, &mut jobs, |_, chunk| {
            let mut builder = Builder::new(bodies, dims);
            for job in chunk {
                builder.grow(&mut job.regions, job.order, job.base, 0);
            }
        })?;

        let subtrees = jobs.len();
        for job in jobs {
            let Subtree {
                root,
                regions: local,
                ..
            } = job;
            // Local index k >= 1 lands at `offset + k`.
            let offset = tree.regions.len() - 1;
            tree.regions[root].children = shift(&local[0].children, offset);
            tree.regions.extend(local.into_iter().skip(1).map(|mut r| {
                r.children = shift(&r.children, offset);
                r
            }));
        }

        debug!(
            regions = tree.regions.len(),
            subtrees, split_rounds, "region tree built"
        );
        Ok(tree)
    }

    /// Recomputes mass, center and size of every region from the current
    /// body positions, keeping the topology.
    pub fn refresh(&mut self, bodies: &[Body], pool: &WorkerPool) -> Result<()> {
        let order = &self.order;
        pool.for_each_chunk(Phase::Tree, &mut self.regions, |_, chunk| {
            for r in chunk {
                r.aggregate(bodies, &order[r.start..r.end]);
            }
        })?;
        debug!(regions = self.regions.len(), "region tree refreshed");
        Ok(())
    }

    /// Repulsion felt by `node` from every other body, approximated by the
    /// tree.
    ///
    /// A region far enough away (`distance * theta > size`) acts as one body
    /// at its center; a leaf is applied member by member. `theta == 0` never
    /// approximates and yields the exact sum.
    pub fn apply_approximate(
        &self,
        bodies: &[Body],
        node: NodeId,
        theta: f64,
        repulsion: &Repulsion,
    ) -> DVec3 {
        let mut d = DVec3::ZERO;
        if self.regions.is_empty() {
            return d;
        }
        let body = &bodies[node];

        let mut stack: Vec<RegionId> = Vec::with_capacity(64);
        stack.push(0);
        while let Some(id) = stack.pop() {
            let r = &self.regions[id];
            if r.is_leaf() {
                for &other in &self.order[r.start..r.end] {
                    if other != node {
                        d += repulsion.between(body, &bodies[other]);
                    }
                }
                continue;
            }
            let distance = (body.position - r.center).length();
            if distance * theta > r.size {
                d += repulsion.from_region(body, r.center, r.mass);
            } else {
                stack.extend(r.children.clone());
            }
        }
        d
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Node indices, grouped so that every region's members are contiguous.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn members(&self, id: RegionId) -> &[NodeId] {
        let r = &self.regions[id];
        &self.order[r.start..r.end]
    }

    pub fn root(&self) -> Option<&Region> {
        self.regions.first()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

fn shift(r: &Range<RegionId>, offset: usize) -> Range<RegionId> {
    (r.start + offset)..(r.end + offset)
}

/// A frontier region, its slice of the order array and its private arena.
struct Subtree<'a> {
    root: RegionId,
    base: usize,
    order: &'a mut [NodeId],
    regions: Vec<Region>,
}

struct Builder<'a> {
    bodies: &'a [Body],
    dims: Dimensions,
    scratch: Vec<NodeId>,
}

impl<'a> Builder<'a> {
    fn new(bodies: &'a [Body], dims: Dimensions) -> Self {
        Self {
            bodies,
            dims,
            scratch: Vec::new(),
        }
    }

    /// Splits everything below `root` down to single-member leaves.
    ///
    /// `order` is the slice of the shared order array starting at absolute
    /// index `base`.
    fn grow(&mut self, regions: &mut Vec<Region>, order: &mut [NodeId], base: usize, root: RegionId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if regions[id].len() <= 1 {
                continue;
            }
            for child in self.split(regions, order, base, id) {
                if regions[child].len() > 1 {
                    stack.push(child);
                }
            }
        }
    }

    /// Partitions the members of `id` around its center and appends one
    /// child per non-empty part. Returns the arena range of the children.
    fn split(
        &mut self,
        regions: &mut Vec<Region>,
        order: &mut [NodeId],
        base: usize,
        id: RegionId,
    ) -> Range<RegionId> {
        let (start, end, center) = {
            let r = &regions[id];
            (r.start, r.end, r.center)
        };
        let groups = self.partition(&mut order[start - base..end - base], center);

        let first = regions.len();
        if groups.len() <= 1 {
            // Nothing separated (coincident members): one leaf each.
            for i in start..end {
                let local = i - base;
                regions.push(Region::from_members(
                    i,
                    i + 1,
                    self.bodies,
                    &order[local..local + 1],
                ));
            }
        } else {
            for g in groups {
                let (s, e) = (start + g.start, start + g.end);
                regions.push(Region::from_members(
                    s,
                    e,
                    self.bodies,
                    &order[s - base..e - base],
                ));
            }
        }
        let children = first..regions.len();
        regions[id].children = children.clone();
        children
    }

    /// Stable in-place partition of `members` by the side of `center` they
    /// fall on along each axis. Returns the non-empty parts.
    fn partition(&mut self, members: &mut [NodeId], center: DVec3) -> Vec<Range<usize>> {
        let branches = self.dims.branch_factor();
        let mut counts = [0usize; 8];
        for &id in members.iter() {
            counts[self.octant(id, center)] += 1;
        }

        let mut offsets = [0usize; 8];
        let mut groups = Vec::with_capacity(branches);
        let mut acc = 0;
        for k in 0..branches {
            offsets[k] = acc;
            if counts[k] > 0 {
                groups.push(acc..acc + counts[k]);
            }
            acc += counts[k];
        }

        self.scratch.clear();
        self.scratch.extend_from_slice(members);
        for &id in &self.scratch {
            let k = self.octant(id, center);
            members[offsets[k]] = id;
            offsets[k] += 1;
        }
        groups
    }

    #[inline]
    fn octant(&self, id: NodeId, center: DVec3) -> usize {
        let p = self.bodies[id].position;
        let mut k = usize::from(p.x >= center.x) | usize::from(p.y >= center.y) << 1;
        if self.dims.is_3d() {
            k |= usize::from(p.z >= center.z) << 2;
        }
        k
    }
}
