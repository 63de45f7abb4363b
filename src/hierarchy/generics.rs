use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// A record that points at its parent by id.
pub trait HierarchyItem {
    fn item_id(&self) -> &str;
    fn parent_id(&self) -> Option<&str>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicTreeNode<T> {
    pub data: T,
    pub children: Vec<BasicTreeNode<T>>,
}

/// Flat index over a slice of hierarchy items: id -> position, and
/// parent position -> child positions (in input order).
pub struct HierarchyIndex<'a, T> {
    items: &'a [T],
    positions: HashMap<&'a str, usize>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
}

impl<'a, T: HierarchyItem> HierarchyIndex<'a, T> {
    pub fn new(items: &'a [T]) -> Self {
        let mut positions = HashMap::with_capacity(items.len());
        for (pos, item) in items.iter().enumerate() {
            positions.entry(item.item_id()).or_insert(pos);
        }

        let mut children = vec![Vec::new(); items.len()];
        let mut roots = Vec::new();
        for (pos, item) in items.iter().enumerate() {
            // Duplicate ids: only the first occurrence takes part in the tree
            if positions.get(item.item_id()) != Some(&pos) {
                continue;
            }
            match item.parent_id().and_then(|pid| positions.get(pid)) {
                Some(&parent_pos) if parent_pos != pos => children[parent_pos].push(pos),
                _ => roots.push(pos),
            }
        }

        Self {
            items,
            positions,
            children,
            roots,
        }
    }

    pub fn items(&self) -> &'a [T] {
        self.items
    }

    pub fn get(&self, id: &str) -> Option<&'a T> {
        self.positions.get(id).map(|&pos| &self.items[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn roots(&self) -> impl Iterator<Item = &'a T> + '_ {
        self.roots.iter().map(|&pos| &self.items[pos])
    }

    /// Direct children of `id`, in input order.
    pub fn children_of(&self, id: &str) -> Vec<&'a T> {
        self.positions
            .get(id)
            .map(|&pos| self.children[pos].iter().map(|&c| &self.items[c]).collect())
            .unwrap_or_default()
    }

    /// Ancestors of `id` from its parent upwards. Stops at the first id seen twice.
    pub fn ancestors(&self, id: &str) -> Vec<&'a T> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut ancestors = Vec::new();
        let Some(start) = self.get(id) else {
            return ancestors;
        };
        visited.insert(start.item_id());

        let mut current = start.parent_id();
        while let Some(pid) = current {
            if !visited.insert(pid) {
                break;
            }
            let Some(parent) = self.get(pid) else {
                break;
            };
            ancestors.push(parent);
            current = parent.parent_id();
        }
        ancestors
    }

    /// All proper descendants of `id` in depth-first pre-order: every item
    /// comes before its own descendants. Each item appears at most once.
    pub fn descendants(&self, id: &str) -> Vec<&'a T> {
        let mut descendants = Vec::new();
        let Some(&start) = self.positions.get(id) else {
            return descendants;
        };

        let mut visited: HashSet<usize> = HashSet::from([start]);
        let mut stack: Vec<usize> = self.children[start].iter().rev().copied().collect();
        while let Some(pos) = stack.pop() {
            if !visited.insert(pos) {
                continue;
            }
            descendants.push(&self.items[pos]);
            stack.extend(
                self.children[pos]
                    .iter()
                    .rev()
                    .filter(|c| !visited.contains(*c)),
            );
        }
        descendants
    }

    /// Materializes the forest with siblings sorted by `compare` at every level.
    ///
    /// Items stuck in a parent cycle are unreachable from any root; the first
    /// of them (in input order) is promoted to a root so nothing is dropped.
    pub fn build_tree<F>(&self, compare: F) -> Vec<BasicTreeNode<T>>
    where
        T: Clone,
        F: Fn(&T, &T) -> Ordering,
    {
        let mut visited = vec![false; self.items.len()];
        let mut roots = self.roots.clone();
        roots.sort_by(|&a, &b| compare(&self.items[a], &self.items[b]));

        let mut tree: Vec<BasicTreeNode<T>> = roots
            .into_iter()
            .map(|pos| self.build_subtree(pos, &compare, &mut visited))
            .collect();

        let mut stranded = Vec::new();
        for pos in 0..self.items.len() {
            let is_first = self.positions.get(self.items[pos].item_id()) == Some(&pos);
            if is_first && !visited[pos] {
                stranded.push(self.build_subtree(pos, &compare, &mut visited));
            }
        }
        if !stranded.is_empty() {
            tree.extend(stranded);
            tree.sort_by(|a, b| compare(&a.data, &b.data));
        }

        tree
    }

    fn build_subtree<F>(&self, pos: usize, compare: &F, visited: &mut [bool]) -> BasicTreeNode<T>
    where
        T: Clone,
        F: Fn(&T, &T) -> Ordering,
    {
        visited[pos] = true;
        let mut children: Vec<usize> = self.children[pos]
            .iter()
            .copied()
            .filter(|&c| !visited[c])
            .collect();
        children.sort_by(|&a, &b| compare(&self.items[a], &self.items[b]));

        let mut nodes = Vec::with_capacity(children.len());
        for child in children {
            // A sibling's subtree may already have claimed this item on cyclic input
            if !visited[child] {
                nodes.push(self.build_subtree(child, compare, visited));
            }
        }

        BasicTreeNode {
            data: self.items[pos].clone(),
            children: nodes,
        }
    }
}

/// Returns true when attaching `child_id` under `potential_parent_id` would make
/// `child_id` its own ancestor. Walks parent pointers with a visited set, so
/// pre-existing cycles elsewhere cannot hang the check.
pub fn is_circular_reference<'a, F>(
    child_id: &str,
    potential_parent_id: Option<&'a str>,
    mut get_parent_fn: F,
) -> bool
where
    F: FnMut(&'a str) -> Option<&'a str>,
{
    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = potential_parent_id;
    while let Some(pid) = current {
        if pid == child_id {
            return true;
        }
        if !visited.insert(pid) {
            return false;
        }
        current = get_parent_fn(pid);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: &'static str,
        parent: Option<&'static str>,
    }

    impl HierarchyItem for Item {
        fn item_id(&self) -> &str {
            self.id
        }

        fn parent_id(&self) -> Option<&str> {
            self.parent
        }
    }

    fn item(id: &'static str, parent: Option<&'static str>) -> Item {
        Item { id, parent }
    }

    fn by_id(a: &Item, b: &Item) -> Ordering {
        a.id.cmp(b.id)
    }

    #[test]
    fn test_build_generic_tree() {
        let items = vec![
            item("c", Some("a")),
            item("a", None),
            item("b", Some("a")),
            item("d", None),
        ];
        let index = HierarchyIndex::new(&items);
        let tree = index.build_tree(by_id);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].data.id, "a");
        let children: Vec<_> = tree[0].children.iter().map(|n| n.data.id).collect();
        assert_eq!(children, vec!["b", "c"]);
        assert_eq!(tree[1].data.id, "d");
        assert!(tree[1].children.is_empty());
    }

    #[test]
    fn test_cycle_members_are_promoted_not_dropped() {
        let items = vec![item("a", Some("b")), item("b", Some("a")), item("r", None)];
        let index = HierarchyIndex::new(&items);
        let tree = index.build_tree(by_id);

        fn count(nodes: &[BasicTreeNode<Item>]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.children)).sum()
        }
        assert_eq!(count(&tree), 3);
        let ids: Vec<_> = tree.iter().map(|n| n.data.id).collect();
        assert_eq!(ids, vec!["a", "r"]);
        assert_eq!(tree[0].children[0].data.id, "b");
        assert!(tree[0].children[0].children.is_empty());
    }

    #[test]
    fn test_self_parent_is_a_root() {
        let items = vec![item("a", Some("a"))];
        let index = HierarchyIndex::new(&items);
        assert_eq!(index.roots().count(), 1);
        assert!(index.descendants("a").is_empty());
        assert!(index.ancestors("a").is_empty());
    }

    #[test]
    fn test_ancestors_stop_on_cycle() {
        let items = vec![item("a", Some("b")), item("b", Some("c")), item("c", Some("a"))];
        let index = HierarchyIndex::new(&items);
        let ancestors: Vec<_> = index.ancestors("a").iter().map(|i| i.id).collect();
        assert_eq!(ancestors, vec!["b", "c"]);
    }

    #[test]
    fn test_is_circular_reference() {
        let items = vec![item("a", None), item("b", Some("a")), item("c", Some("b"))];
        let index = HierarchyIndex::new(&items);
        let parent_of = |id: &str| index.get(id).and_then(|i| i.parent);

        // Moving a under c would make a its own ancestor
        assert!(is_circular_reference("a", Some("c"), parent_of));
        assert!(is_circular_reference("a", Some("a"), parent_of));
        assert!(!is_circular_reference("c", Some("a"), parent_of));
        assert!(!is_circular_reference("c", None, parent_of));
    }

    #[test]
    fn test_is_circular_reference_terminates_on_existing_cycle() {
        let items = vec![item("x", Some("y")), item("y", Some("x")), item("z", None)];
        let index = HierarchyIndex::new(&items);
        let parent_of = |id: &str| index.get(id).and_then(|i| i.parent);

        assert!(!is_circular_reference("z", Some("x"), parent_of));
    }
}
