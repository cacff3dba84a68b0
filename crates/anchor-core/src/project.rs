//! Project root resolution for note storage.
//!
//! Algorithm:
//! 1. Pick the workspace root that contains the file (first root otherwise)
//! 2. Crawl from the file's directory up to that root
//! 3. Return the first directory holding a project marker file
//! 4. Fall back to the workspace root itself

use std::path::{Path, PathBuf};

/// Marker files that make a directory a project root.
pub const DEFAULT_MARKERS: &[&str] = &[
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.toml",
];

/// Source of the host's top-level project directories.
pub trait WorkspaceRoots: Send + Sync {
    fn roots(&self) -> Vec<PathBuf>;
}

/// Fixed list of workspace roots.
#[derive(Debug, Clone, Default)]
pub struct StaticWorkspace {
    roots: Vec<PathBuf>,
}

impl StaticWorkspace {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn single(root: impl Into<PathBuf>) -> Self {
        Self::new(vec![root.into()])
    }
}

impl WorkspaceRoots for StaticWorkspace {
    fn roots(&self) -> Vec<PathBuf> {
        self.roots.clone()
    }
}

#[derive(Debug, Clone)]
pub struct ProjectResolver {
    markers: Vec<String>,
}

impl Default for ProjectResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MARKERS.iter().map(|m| m.to_string()).collect())
    }
}

impl ProjectResolver {
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// Directory whose note store holds the notes for `file`.
    ///
    /// Returns `None` only when the workspace has no roots at all.
    pub fn resolve(&self, workspace: &dyn WorkspaceRoots, file: &Path) -> Option<PathBuf> {
        let roots = workspace.roots();
        let workspace_root = roots
            .iter()
            .find(|root| file.starts_with(root))
            .or_else(|| roots.first())?
            .clone();

        let mut dir = file.parent();
        while let Some(current) = dir {
            if !current.starts_with(&workspace_root) {
                break;
            }
            if self.has_marker(current) {
                return Some(current.to_path_buf());
            }
            dir = current.parent();
        }

        Some(workspace_root)
    }

    fn has_marker(&self, dir: &Path) -> bool {
        self.markers.iter().any(|marker| dir.join(marker).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_nearest_marker_wins() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("packages/web/src")).unwrap();
        fs::write(root.join("package.json"), "{}").unwrap();
        fs::write(root.join("packages/web/package.json"), "{}").unwrap();

        let workspace = StaticWorkspace::single(root);
        let resolved = ProjectResolver::default()
            .resolve(&workspace, &root.join("packages/web/src/app.ts"))
            .unwrap();
        assert_eq!(resolved, root.join("packages/web"));
    }

    #[test]
    fn test_falls_back_to_workspace_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("a/b")).unwrap();

        let workspace = StaticWorkspace::single(root);
        let resolved = ProjectResolver::default()
            .resolve(&workspace, &root.join("a/b/file.rs"))
            .unwrap();
        assert_eq!(resolved, root);
    }

    #[test]
    fn test_does_not_escape_workspace() {
        let temp = TempDir::new().unwrap();
        let outer = temp.path();
        let root = outer.join("ws");
        fs::create_dir_all(root.join("src")).unwrap();
        // Marker above the workspace root must be ignored.
        fs::write(outer.join("Cargo.toml"), "").unwrap();

        let workspace = StaticWorkspace::single(&root);
        let resolved = ProjectResolver::default()
            .resolve(&workspace, &root.join("src/main.rs"))
            .unwrap();
        assert_eq!(resolved, root);
    }

    #[test]
    fn test_picks_containing_root() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("one");
        let second = temp.path().join("two");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(second.join("src")).unwrap();

        let workspace = StaticWorkspace::new(vec![first, second.clone()]);
        let resolved = ProjectResolver::default()
            .resolve(&workspace, &second.join("src/lib.rs"))
            .unwrap();
        assert_eq!(resolved, second);
    }

    #[test]
    fn test_no_roots() {
        let workspace = StaticWorkspace::default();
        assert!(ProjectResolver::default()
            .resolve(&workspace, Path::new("/tmp/x.rs"))
            .is_none());
    }

    #[test]
    fn test_custom_markers() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("svc/src")).unwrap();
        fs::write(root.join("svc/go.mod"), "module svc").unwrap();

        let workspace = StaticWorkspace::single(root);
        let resolver = ProjectResolver::new(vec!["go.mod".into()]);
        assert_eq!(
            resolver.resolve(&workspace, &root.join("svc/src/main.go")),
            Some(root.join("svc"))
        );
    }
}
