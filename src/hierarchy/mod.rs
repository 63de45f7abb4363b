pub mod deletion;
pub mod folders;
pub mod generics;

pub use deletion::{
    delete_folder, delete_folder_checked, deletion_prompt, DeleteMode, DeletionError,
    DeletionReport, DeletionStep,
};
pub use folders::{
    build_tree, compare_names, compare_siblings, DeletionPrompt, FolderHierarchy, FolderNode,
    PATH_SEPARATOR,
};
