use super::generics::{is_circular_reference, BasicTreeNode, HierarchyIndex, HierarchyItem};
use crate::tables::{Folder, Note, RecordId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

pub const PATH_SEPARATOR: &str = " > ";

impl HierarchyItem for Folder {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn parent_id(&self) -> Option<&str> {
        self.parent_folder_id.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderNode {
    #[serde(flatten)]
    pub folder: Folder,
    pub children: Vec<FolderNode>,
}

impl FolderNode {
    fn from_basic(node: BasicTreeNode<Folder>) -> Self {
        Self {
            folder: node.data,
            children: node.children.into_iter().map(Self::from_basic).collect(),
        }
    }

    /// Number of nodes strictly below this one.
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| 1 + child.descendant_count())
            .sum()
    }
}

/// Whether deleting a folder needs the caller to pick a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeletionPrompt {
    Direct,
    ChooseMode { subfolders: usize, notes: usize },
}

impl DeletionPrompt {
    pub fn new(subfolders: usize, notes: usize) -> Self {
        if subfolders == 0 && notes == 0 {
            Self::Direct
        } else {
            Self::ChooseMode { subfolders, notes }
        }
    }

    pub fn requires_mode(&self) -> bool {
        matches!(self, Self::ChooseMode { .. })
    }
}

/// Sibling order: `sort_order` ascending, then name.
pub fn compare_siblings(a: &Folder, b: &Folder) -> Ordering {
    a.sort_order
        .cmp(&b.sort_order)
        .then_with(|| compare_names(&a.name, &b.name))
}

/// Locale-style name order: letters compare without regard to case, and on
/// names differing only in case the lowercase form comes first.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| b.cmp(a))
}

pub fn build_tree(folders: &[Folder]) -> Vec<FolderNode> {
    FolderHierarchy::new(folders).build_tree()
}

/// Read-only queries over a flat folder list.
pub struct FolderHierarchy<'a> {
    index: HierarchyIndex<'a, Folder>,
}

impl<'a> FolderHierarchy<'a> {
    pub fn new(folders: &'a [Folder]) -> Self {
        Self {
            index: HierarchyIndex::new(folders),
        }
    }

    pub fn get(&self, id: &str) -> Option<&'a Folder> {
        self.index.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    pub fn build_tree(&self) -> Vec<FolderNode> {
        self.index
            .build_tree(compare_siblings)
            .into_iter()
            .map(FolderNode::from_basic)
            .collect()
    }

    /// Folders from the top level down to and including `id`.
    pub fn lineage(&self, id: &str) -> Vec<&'a Folder> {
        let Some(folder) = self.index.get(id) else {
            return Vec::new();
        };
        let mut lineage = self.index.ancestors(id);
        lineage.reverse();
        lineage.push(folder);
        lineage
    }

    /// Names from the root down to `id`, joined with `" > "`.
    pub fn folder_path(&self, id: &str) -> String {
        self.lineage(id)
            .into_iter()
            .map(|f| f.name.as_str())
            .collect::<Vec<_>>()
            .join(PATH_SEPARATOR)
    }

    pub fn folder_paths(&self) -> HashMap<RecordId, String> {
        self.index
            .items()
            .iter()
            .map(|f| (f.id.clone(), self.folder_path(&f.id)))
            .collect()
    }

    /// Proper descendants in discovery order; parents precede their children.
    pub fn descendant_folders(&self, id: &str) -> Vec<&'a Folder> {
        self.index.descendants(id)
    }

    pub fn children(&self, id: &str) -> Vec<&'a Folder> {
        self.index.children_of(id)
    }

    pub fn folders_by_category(&self, category_id: &str) -> Vec<&'a Folder> {
        self.index
            .items()
            .iter()
            .filter(|f| f.category_id == category_id)
            .collect()
    }

    /// Folders whose parent pointer equals `parent_id` (`None` for top level).
    pub fn folders_by_parent(&self, parent_id: Option<&str>) -> Vec<&'a Folder> {
        self.index
            .items()
            .iter()
            .filter(|f| f.parent_folder_id.as_deref() == parent_id)
            .collect()
    }

    /// Parents a folder of `category_id` may be moved under. When editing an
    /// existing folder, the folder itself and its subtree are excluded.
    pub fn available_parents(
        &self,
        category_id: &str,
        editing_folder_id: Option<&str>,
    ) -> Vec<&'a Folder> {
        let excluded: HashSet<&str> = match editing_folder_id {
            Some(id) => self
                .descendant_folders(id)
                .into_iter()
                .map(|f| f.id.as_str())
                .chain(std::iter::once(id))
                .collect(),
            None => HashSet::new(),
        };

        self.folders_by_category(category_id)
            .into_iter()
            .filter(|f| !excluded.contains(f.id.as_str()))
            .collect()
    }

    pub fn would_create_cycle(&self, folder_id: &str, new_parent_id: Option<&str>) -> bool {
        is_circular_reference(folder_id, new_parent_id, |id| {
            self.index.get(id).and_then(|f| f.parent_folder_id.as_deref())
        })
    }

    /// The folder followed by its descendants.
    pub fn deletion_scope(&self, id: &str) -> Vec<RecordId> {
        std::iter::once(id.to_string())
            .chain(self.descendant_folders(id).into_iter().map(|f| f.id.clone()))
            .collect()
    }

    pub fn deletion_prompt(&self, id: &str, notes: &[Note]) -> DeletionPrompt {
        let scope = self.deletion_scope(id);
        let note_count = notes
            .iter()
            .filter(|n| n.folder_id.as_ref().is_some_and(|f| scope.contains(f)))
            .count();
        DeletionPrompt::new(scope.len() - 1, note_count)
    }
}
