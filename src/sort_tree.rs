//! # Sort Tree
//!
//! A balanced, sorted binary tree whose shape depends only on the multiset of
//! names it holds, never on the order they were added in.
//! Only leaves carry item data; internal nodes join two subtrees and cache
//! the aggregate `node_count`, `size`, and `min_name` the rest of the tree
//! needs without re-walking to the leaves.
//!
//! Balance here is by *node count*, not height — a weight-balanced tree, not
//! a height-balanced one — and the tolerance is deliberately asymmetric: a
//! left-heavy node only rotates once its count excess exceeds two, while any
//! right-heaviness at all triggers a rotation. That asymmetry (not a
//! symmetric +-1 AVL tolerance) is what makes the final shape a pure
//! function of the name set, independent of insertion order.

use std::cmp::Ordering;

use crate::error::{CoreError, CoreResult};
use crate::name_order::compare_names;

pub type Hash32 = [u8; 32];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedItem {
    pub name: String,
    pub content_hash: Hash32,
    pub length: u64,
    /// Milliseconds since epoch; `None` means absent (serialized as `0`).
    pub last_modified: Option<u64>,
}

impl HashedItem {
    pub fn new(name: impl Into<String>, content_hash: Hash32) -> Self {
        Self { name: name.into(), content_hash, length: 0, last_modified: None }
    }

    pub fn with_metadata(
        name: impl Into<String>,
        content_hash: Hash32,
        length: u64,
        last_modified: Option<u64>,
    ) -> Self {
        Self { name: name.into(), content_hash, length, last_modified }
    }
}

#[derive(Debug, Clone)]
pub enum SortNode {
    Leaf(HashedItem),
    Internal {
        left: Box<SortNode>,
        right: Box<SortNode>,
        node_count: usize,
        size: u64,
        min_name: String,
    },
}

impl SortNode {
    pub fn node_count(&self) -> usize {
        match self {
            SortNode::Leaf(_) => 1,
            SortNode::Internal { node_count, .. } => *node_count,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            SortNode::Leaf(item) => item.length,
            SortNode::Internal { size, .. } => *size,
        }
    }

    pub fn min_name(&self) -> &str {
        match self {
            SortNode::Leaf(item) => &item.name,
            SortNode::Internal { min_name, .. } => min_name,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, SortNode::Leaf(_))
    }
}

/// Recomputes `node_count`/`size`/`min_name` from the children. Visible to
/// the format module so legacy deserializers can reconstruct a tree node by
/// node without re-deriving this bookkeeping by hand, and without trusting
/// whatever aggregate a legacy file happened to serialize.
pub(crate) fn make_internal(left: SortNode, right: SortNode) -> SortNode {
    let node_count = 1 + left.node_count() + right.node_count();
    let size = left.size() + right.size();
    let min_name = left.min_name().to_string();
    SortNode::Internal { left: Box::new(left), right: Box::new(right), node_count, size, min_name }
}

/// Single left rotation or RL double rotation, chosen by comparing the
/// right child's grandchildren node counts (`>=` picks the RR case).
/// Reaching this function at all means `right` was heavier than `left` by
/// node count, which (every node has `node_count >= 1`) guarantees `right`
/// is an `Internal` node, so the match below never hits its unreachable arm.
fn rotate_left(left: SortNode, right: SortNode) -> SortNode {
    match right {
        SortNode::Internal { left: rl, right: rr, .. } => {
            if rl.node_count() > rr.node_count() {
                // RL case: rl must itself be Internal, by the same count argument.
                match *rl {
                    SortNode::Internal { left: rll, right: rlr, .. } => {
                        make_internal(make_internal(left, *rll), make_internal(*rlr, *rr))
                    }
                    SortNode::Leaf(_) => unreachable!("rl.node_count() > rr.node_count() forces rl to be internal"),
                }
            } else {
                // RR case (rr.node_count() >= rl.node_count()): single rotation.
                make_internal(make_internal(left, *rl), *rr)
            }
        }
        SortNode::Leaf(_) => unreachable!("right-heavy imbalance guarantees an internal right child"),
    }
}

/// Mirror of [`rotate_left`] for the left-heavy case.
fn rotate_right(left: SortNode, right: SortNode) -> SortNode {
    match left {
        SortNode::Internal { left: ll, right: lr, .. } => {
            if lr.node_count() > ll.node_count() {
                match *lr {
                    SortNode::Internal { left: lrl, right: lrr, .. } => {
                        make_internal(make_internal(*ll, *lrl), make_internal(*lrr, right))
                    }
                    SortNode::Leaf(_) => unreachable!("lr.node_count() > ll.node_count() forces lr to be internal"),
                }
            } else {
                // LL case (ll.node_count() >= lr.node_count()): single rotation.
                make_internal(*ll, make_internal(*lr, right))
            }
        }
        SortNode::Leaf(_) => unreachable!("left-heavy imbalance guarantees an internal left child"),
    }
}

fn rebalance(node: SortNode) -> SortNode {
    match node {
        SortNode::Leaf(_) => node,
        SortNode::Internal { left, right, .. } => {
            let bf = left.node_count() as i64 - right.node_count() as i64;
            if bf > 2 {
                rotate_right(*left, *right)
            } else if bf < 0 {
                rotate_left(*left, *right)
            } else {
                make_internal(*left, *right)
            }
        }
    }
}

/// `true` iff `name` belongs in the left subtree under the pivot rule used
/// throughout this module: descend left iff `name < right.min_name()`.
fn goes_left(name: &str, right: &SortNode) -> bool {
    compare_names(name, right.min_name()) == Ordering::Less
}

fn insert_rec(node: SortNode, item: HashedItem) -> SortNode {
    match node {
        SortNode::Leaf(existing) => {
            if compare_names(&item.name, &existing.name) == Ordering::Less {
                make_internal(SortNode::Leaf(item), SortNode::Leaf(existing))
            } else {
                make_internal(SortNode::Leaf(existing), SortNode::Leaf(item))
            }
        }
        SortNode::Internal { left, right, .. } => {
            if goes_left(&item.name, &right) {
                rebalance(make_internal(insert_rec(*left, item), *right))
            } else {
                rebalance(make_internal(*left, insert_rec(*right, item)))
            }
        }
    }
}

fn delete_rec(node: SortNode, name: &str) -> CoreResult<Option<SortNode>> {
    match node {
        SortNode::Leaf(item) => {
            if item.name == name {
                Ok(None)
            } else {
                Err(CoreError::NotFound(name.to_string()))
            }
        }
        SortNode::Internal { left, right, .. } => {
            if goes_left(name, &right) {
                match delete_rec(*left, name)? {
                    None => Ok(Some(*right)),
                    Some(new_left) => Ok(Some(rebalance(make_internal(new_left, *right)))),
                }
            } else {
                match delete_rec(*right, name)? {
                    None => Ok(Some(*left)),
                    Some(new_right) => Ok(Some(rebalance(make_internal(*left, new_right)))),
                }
            }
        }
    }
}

fn set_fields_if_present(
    node: Option<&mut SortNode>,
    name: &str,
    content_hash: Hash32,
    length: u64,
    last_modified: Option<u64>,
) -> bool {
    match node {
        None => false,
        Some(SortNode::Leaf(item)) => {
            if item.name == name {
                item.content_hash = content_hash;
                item.length = length;
                item.last_modified = last_modified;
                true
            } else {
                false
            }
        }
        Some(SortNode::Internal { left, right, .. }) => {
            if goes_left(name, right) {
                set_fields_if_present(Some(left.as_mut()), name, content_hash, length, last_modified)
            } else {
                set_fields_if_present(Some(right.as_mut()), name, content_hash, length, last_modified)
            }
        }
    }
}

fn find_rec<'a>(node: &'a SortNode, name: &str) -> Option<&'a HashedItem> {
    match node {
        SortNode::Leaf(item) => (item.name == name).then_some(item),
        SortNode::Internal { left, right, .. } => {
            if goes_left(name, right) {
                find_rec(left, name)
            } else {
                find_rec(right, name)
            }
        }
    }
}

/// Pull-based preorder iterator over every node (internal and leaf) in the
/// tree, backed by an explicit stack rather than recursion.
pub struct PreorderIter<'a> {
    stack: Vec<&'a SortNode>,
}

impl<'a> Iterator for PreorderIter<'a> {
    type Item = &'a SortNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        if let SortNode::Internal { left, right, .. } = node {
            self.stack.push(right);
            self.stack.push(left);
        }
        Some(node)
    }
}

#[derive(Debug, Default, Clone)]
pub struct SortTree {
    root: Option<SortNode>,
}

impl SortTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<&SortNode> {
        self.root.as_ref()
    }

    /// Replaces the whole tree with an externally constructed root (used by
    /// the deserializer, which reconstructs nodes directly from bytes).
    pub fn set_root(&mut self, root: Option<SortNode>) {
        self.root = root;
    }

    pub fn len(&self) -> usize {
        self.root.as_ref().map_or(0, SortNode::node_count)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Inserts a new name. Fails with [`CoreError::Precondition`] if the name
    /// is already present; use [`SortTree::upsert`] to insert-or-replace.
    pub fn add(&mut self, item: HashedItem) -> CoreResult<()> {
        if self.find(&item.name).is_some() {
            return Err(CoreError::Precondition(format!("name already exists: {}", item.name)));
        }
        self.root = Some(match self.root.take() {
            None => SortNode::Leaf(item),
            Some(root) => insert_rec(root, item),
        });
        Ok(())
    }

    /// Inserts a new name, or replaces the content hash / length / last
    /// modified time of an existing one in place (no rebalancing needed,
    /// since the shape does not change).
    pub fn upsert(&mut self, item: HashedItem) {
        if set_fields_if_present(self.root.as_mut(), &item.name, item.content_hash, item.length, item.last_modified) {
            return;
        }
        self.root = Some(match self.root.take() {
            None => SortNode::Leaf(item),
            Some(root) => insert_rec(root, item),
        });
    }

    /// Replaces the fields of an existing name. Fails with
    /// [`CoreError::NotFound`] if the name is absent.
    pub fn update(&mut self, name: &str, content_hash: Hash32, length: u64, last_modified: Option<u64>) -> CoreResult<()> {
        if set_fields_if_present(self.root.as_mut(), name, content_hash, length, last_modified) {
            Ok(())
        } else {
            Err(CoreError::NotFound(name.to_string()))
        }
    }

    /// Removes a name. A non-existent name is a silent no-op.
    pub fn delete(&mut self, name: &str) -> CoreResult<()> {
        let Some(root) = self.root.take() else { return Ok(()) };
        self.root = match delete_rec(root, name) {
            Ok(new_root) => new_root,
            Err(CoreError::NotFound(_)) => {
                // restore: the name wasn't present, nothing changed.
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&HashedItem> {
        self.root.as_ref().and_then(|r| find_rec(r, name))
    }

    pub fn leaves_in_order(&self) -> Vec<&HashedItem> {
        fn rec<'a>(node: &'a SortNode, out: &mut Vec<&'a HashedItem>) {
            match node {
                SortNode::Leaf(item) => out.push(item),
                SortNode::Internal { left, right, .. } => {
                    rec(left, out);
                    rec(right, out);
                }
            }
        }
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            rec(root, &mut out);
        }
        out
    }

    pub fn preorder(&self) -> PreorderIter<'_> {
        PreorderIter { stack: self.root.iter().collect() }
    }

    /// Visits every node in preorder. Returning `Err(CoreError::Cancelled)`
    /// from `visit` stops the traversal early and is not surfaced as an
    /// error to the caller; any other error propagates and leaves the tree
    /// itself unmodified (traversal never mutates).
    pub fn traverse_preorder<F>(&self, mut visit: F) -> CoreResult<()>
    where
        F: FnMut(&SortNode) -> CoreResult<()>,
    {
        fn rec<F>(node: &SortNode, visit: &mut F) -> CoreResult<()>
        where
            F: FnMut(&SortNode) -> CoreResult<()>,
        {
            visit(node)?;
            if let SortNode::Internal { left, right, .. } = node {
                rec(left, visit)?;
                rec(right, visit)?;
            }
            Ok(())
        }
        match self.root.as_ref() {
            None => Ok(()),
            Some(root) => match rec(root, &mut visit) {
                Ok(()) => Ok(()),
                Err(CoreError::Cancelled) => Ok(()),
                Err(e) => Err(e),
            },
        }
    }

    /// Deletes each of `names` if present, silently skipping absent ones,
    /// and returns the subset that was actually removed. Used to implement
    /// prune-by-Merkle-subtree at the tree layer, which first expands a list
    /// of Merkle subtree roots into leaf names via `merkle::LeafNames`.
    pub fn prune(&mut self, names: &[String]) -> Vec<String> {
        let mut pruned = Vec::new();
        for name in names {
            if self.find(name).is_some() {
                self.delete(name).expect("presence just checked");
                pruned.push(name.clone());
            }
        }
        pruned
    }

    /// Drops every leaf whose name starts with any of `drop_prefixes`, then
    /// rebuilds a fresh canonical tree from the survivors in sorted order.
    /// O(n log n); intended for cleanup and format-upgrade passes only, not
    /// routine mutation.
    pub fn rebuild(&mut self, drop_prefixes: &[String]) {
        let survivors: Vec<HashedItem> = self
            .leaves_in_order()
            .into_iter()
            .filter(|item| !drop_prefixes.iter().any(|p| item.name.starts_with(p.as_str())))
            .cloned()
            .collect();
        self.root = None;
        for item in survivors {
            self.root = Some(match self.root.take() {
                None => SortNode::Leaf(item),
                Some(root) => insert_rec(root, item),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    fn hash_of(s: &str) -> Hash32 {
        let mut hasher = Sha256::new();
        hasher.update(s.as_bytes());
        hasher.finalize().into()
    }

    fn item(name: &str) -> HashedItem {
        HashedItem::new(name, hash_of(name))
    }

    fn structural_shape(node: &SortNode) -> String {
        match node {
            SortNode::Leaf(item) => item.name.clone(),
            SortNode::Internal { left, right, .. } => {
                format!("({},{})", structural_shape(left), structural_shape(right))
            }
        }
    }

    fn assert_balanced(node: &SortNode) {
        if let SortNode::Internal { left, right, .. } = node {
            let bf = left.node_count() as i64 - right.node_count() as i64;
            assert!((0..=2).contains(&bf), "imbalanced node: bf={bf}");
            assert_balanced(left);
            assert_balanced(right);
        }
    }

    fn assert_aggregates_correct(node: &SortNode) {
        if let SortNode::Internal { left, right, node_count, size, min_name } = node {
            assert_eq!(*node_count, 1 + left.node_count() + right.node_count());
            assert_eq!(*size, left.size() + right.size());
            assert_eq!(min_name, left.min_name());
            assert_aggregates_correct(left);
            assert_aggregates_correct(right);
        }
    }

    #[test]
    fn shape_is_independent_of_insertion_order() {
        let names = ["beta", "alpha", "delta", "gamma", "epsilon", "zeta", "file2", "file10"];
        let mut forward = SortTree::new();
        for n in &names {
            forward.add(item(n)).unwrap();
        }

        let mut reversed = SortTree::new();
        for n in names.iter().rev() {
            reversed.add(item(n)).unwrap();
        }

        let root_fwd = forward.root().unwrap();
        let root_rev = reversed.root().unwrap();
        assert_eq!(structural_shape(root_fwd), structural_shape(root_rev));
    }

    #[test]
    fn tree_stays_within_asymmetric_balance_tolerance_and_aggregates_stay_correct() {
        let mut tree = SortTree::new();
        for i in 0..200u32 {
            tree.add(item(&format!("name{i:04}"))).unwrap();
        }
        assert_balanced(tree.root().unwrap());
        assert_aggregates_correct(tree.root().unwrap());
    }

    #[test]
    fn add_rejects_duplicate_names() {
        let mut tree = SortTree::new();
        tree.add(item("a")).unwrap();
        let err = tree.add(item("a")).unwrap_err();
        assert!(matches!(err, CoreError::Precondition(_)));
    }

    #[test]
    fn update_requires_existing_name() {
        let mut tree = SortTree::new();
        let err = tree.update("missing", hash_of("x"), 0, None).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        tree.add(item("present")).unwrap();
        tree.update("present", hash_of("new"), 42, Some(1000)).unwrap();
        let leaf = tree.find("present").unwrap();
        assert_eq!(leaf.content_hash, hash_of("new"));
        assert_eq!(leaf.length, 42);
        assert_eq!(leaf.last_modified, Some(1000));
    }

    #[test]
    fn upsert_inserts_or_replaces_without_duplicating() {
        let mut tree = SortTree::new();
        tree.upsert(item("a"));
        assert_eq!(tree.len(), 1);
        tree.upsert(HashedItem::new("a", hash_of("a-v2")));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.find("a").unwrap().content_hash, hash_of("a-v2"));
    }

    #[test]
    fn delete_of_missing_name_is_a_silent_no_op() {
        let mut tree = SortTree::new();
        tree.add(item("a")).unwrap();
        tree.delete("nope").unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn delete_then_leaves_in_order_reflects_removal() {
        let mut tree = SortTree::new();
        for n in ["a", "b", "c", "d", "e"] {
            tree.add(item(n)).unwrap();
        }
        tree.delete("c").unwrap();
        let names: Vec<&str> = tree.leaves_in_order().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "d", "e"]);
        assert_balanced(tree.root().unwrap());
    }

    #[test]
    fn leaves_in_order_is_sorted_by_name_order() {
        let mut tree = SortTree::new();
        for n in ["file10", "file2", "file1"] {
            tree.add(item(n)).unwrap();
        }
        let names: Vec<&str> = tree.leaves_in_order().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["file1", "file2", "file10"]);
    }

    #[test]
    fn traverse_preorder_visits_every_node_and_honors_cancellation() {
        let mut tree = SortTree::new();
        for n in ["a", "b", "c", "d"] {
            tree.add(item(n)).unwrap();
        }
        let mut visited = 0;
        tree.traverse_preorder(|_| {
            visited += 1;
            Ok(())
        })
        .unwrap();
        assert!(visited > 0);

        let mut stopped_after = 0;
        tree.traverse_preorder(|_| {
            stopped_after += 1;
            if stopped_after == 1 {
                Err(CoreError::Cancelled)
            } else {
                Ok(())
            }
        })
        .unwrap();
        assert_eq!(stopped_after, 1);
    }

    #[test]
    fn preorder_iterator_matches_callback_traversal() {
        let mut tree = SortTree::new();
        for n in ["a", "b", "c"] {
            tree.add(item(n)).unwrap();
        }
        let mut via_callback = Vec::new();
        tree.traverse_preorder(|n| {
            via_callback.push(structural_shape(n));
            Ok(())
        })
        .unwrap();
        let via_iter: Vec<String> = tree.preorder().map(structural_shape).collect();
        assert_eq!(via_callback, via_iter);
    }

    #[test]
    fn prune_removes_named_leaves_and_reports_what_was_removed() {
        let mut tree = SortTree::new();
        for n in ["a", "b", "c", "d", "e"] {
            tree.add(item(n)).unwrap();
        }
        let pruned = tree.prune(&["b".to_string(), "not-there".to_string(), "d".to_string()]);
        assert_eq!(pruned, vec!["b".to_string(), "d".to_string()]);
        let names: Vec<&str> = tree.leaves_in_order().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c", "e"]);
    }

    #[test]
    fn rebuild_drops_matching_prefixes_and_preserves_canonical_shape() {
        let mut a = SortTree::new();
        for n in ["keep1", "drop_x", "keep2", "drop_y", "keep3"] {
            a.add(item(n)).unwrap();
        }
        a.rebuild(&["drop_".to_string()]);
        let names: Vec<&str> = a.leaves_in_order().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["keep1", "keep2", "keep3"]);

        let mut b = SortTree::new();
        for n in ["keep3", "keep1", "keep2"] {
            b.add(item(n)).unwrap();
        }
        assert_eq!(structural_shape(a.root().unwrap()), structural_shape(b.root().unwrap()));
    }

    #[test]
    fn fuzz_random_insertion_orders_converge_on_one_canonical_shape() {
        // Canonical-shape invariance is verified exhaustively for <= 6 items
        // elsewhere (see tree.rs); this fuzzes a larger set across many
        // random insertion orders to catch rebalancing bugs exhaustive
        // enumeration wouldn't reach.
        use rand::seq::SliceRandom;
        use rand::thread_rng;

        let names: Vec<String> = (0..40).map(|i| format!("item{i:03}")).collect();
        let mut rng = thread_rng();

        let mut baseline = SortTree::new();
        for n in &names {
            baseline.add(item(n)).unwrap();
        }
        let baseline_shape = structural_shape(baseline.root().unwrap());
        let baseline_order: Vec<&str> = baseline.leaves_in_order().iter().map(|i| i.name.as_str()).collect();

        for _ in 0..25 {
            let mut shuffled = names.clone();
            shuffled.shuffle(&mut rng);

            let mut tree = SortTree::new();
            for n in &shuffled {
                tree.add(item(n)).unwrap();
            }

            let order: Vec<&str> = tree.leaves_in_order().iter().map(|i| i.name.as_str()).collect();
            assert_eq!(order, baseline_order, "leaf order must be insertion-order independent");
            assert_eq!(
                structural_shape(tree.root().unwrap()),
                baseline_shape,
                "canonical shape must be insertion-order independent"
            );
        }
    }
}
