//! Union-Find with Elder-Rule Merging
//!
//! Every component is represented by its oldest vertex, so the root of a
//! component is also the vertex that carries its birth value. On a merge
//! the caller decides which root is older; the younger root is attached
//! below it and its component dies.

/// Disjoint-set forest over `n` vertices
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    /// Root of the component containing `i` (with path compression)
    pub fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }

        let mut node = i;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Attach root `younger` below root `elder`
    pub fn merge_into(&mut self, elder: usize, younger: usize) {
        debug_assert_eq!(self.parent[elder], elder);
        debug_assert_eq!(self.parent[younger], younger);
        self.parent[younger] = elder;
    }

    /// Number of components
    pub fn count_roots(&mut self) -> usize {
        (0..self.parent.len()).filter(|&i| self.find(i) == i).count()
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }
}
