use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{JudgeError, Result};
use crate::submission::{ModulePath, HARNESS_STEM};

const WORKSPACE_PREFIX: &str = "pyjudge-";
const PACKAGE_MARKER: &str = "__init__.py";

/// Ephemeral directory tree backing exactly one execution.
///
/// Dropping the workspace removes it from disk; `close` does the same but
/// reports failures.
pub struct Workspace {
    dir: TempDir,
    module_file: PathBuf,
    directories: Vec<PathBuf>,
}

impl Workspace {
    /// Create a fresh workspace holding the learner module at `module_path`.
    pub async fn create(
        base: Option<&Path>,
        module_path: &ModulePath,
        user_code: &str,
    ) -> Result<Self> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix(WORKSPACE_PREFIX);
            builder
        };

        let dir = match base {
            Some(base) => {
                tokio::fs::create_dir_all(base).await.map_err(|e| {
                    JudgeError::Workspace(format!(
                        "cannot create workspace directory {}: {}",
                        base.display(),
                        e
                    ))
                })?;
                builder.tempdir_in(base)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| JudgeError::Workspace(format!("cannot create workspace: {}", e)))?;

        let mut directories = vec![dir.path().to_path_buf()];
        let mut package_dir = dir.path().to_path_buf();
        for package in module_path.packages() {
            package_dir.push(package);
            tokio::fs::create_dir_all(&package_dir).await?;
            tokio::fs::write(package_dir.join(PACKAGE_MARKER), "").await?;
            directories.push(package_dir.clone());
        }

        let module_file = package_dir.join(format!("{}.py", module_path.leaf()));
        tokio::fs::write(&module_file, user_code).await?;

        debug!(
            root = %dir.path().display(),
            module = %module_path,
            "Workspace created"
        );

        Ok(Self {
            dir,
            module_file,
            directories,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn module_file(&self) -> &Path {
        &self.module_file
    }

    /// File name of the harness program, relative to the root.
    pub fn harness_file_name() -> String {
        format!("{}.py", HARNESS_STEM)
    }

    pub fn harness_path(&self) -> PathBuf {
        self.root().join(Self::harness_file_name())
    }

    pub async fn write_harness(&self, program: &str) -> Result<()> {
        tokio::fs::write(self.harness_path(), program).await?;
        Ok(())
    }

    /// Unique, name-safe identifier for this workspace (e.g. a container name).
    pub fn id(&self) -> String {
        self.root()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| WORKSPACE_PREFIX.trim_end_matches('-').to_string())
    }

    /// Make the tree readable by other users, for children running under a
    /// different uid (containers).
    #[cfg(unix)]
    pub async fn share_read_only(&self) -> Result<()> {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;

        for directory in &self.directories {
            tokio::fs::set_permissions(directory, Permissions::from_mode(0o755)).await?;
            let mut entries = tokio::fs::read_dir(directory).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    tokio::fs::set_permissions(entry.path(), Permissions::from_mode(0o644))
                        .await?;
                }
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub async fn share_read_only(&self) -> Result<()> {
        Ok(())
    }

    /// Remove the workspace, logging instead of failing.
    pub fn close(self) {
        let root = self.root().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!(root = %root.display(), "Workspace removed"),
            Err(e) => warn!(root = %root.display(), error = %e, "Failed to remove workspace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_creates_package_chain() {
        let base = tempfile::tempdir().unwrap();
        let module: ModulePath = "arrays_and_strings.clone_even_numbers".parse().unwrap();
        let workspace = Workspace::create(Some(base.path()), &module, "def f(): pass\n")
            .await
            .unwrap();

        let package = workspace.root().join("arrays_and_strings");
        assert!(package.join("__init__.py").is_file());
        assert_eq!(
            workspace.module_file(),
            package.join("clone_even_numbers.py").as_path()
        );
        assert_eq!(
            std::fs::read_to_string(workspace.module_file()).unwrap(),
            "def f(): pass\n"
        );
        assert!(workspace.id().starts_with(WORKSPACE_PREFIX));
    }

    #[tokio::test]
    async fn test_close_removes_tree() {
        let base = tempfile::tempdir().unwrap();
        let module: ModulePath = "a.b.c".parse().unwrap();
        let workspace = Workspace::create(Some(base.path()), &module, "x = 1\n")
            .await
            .unwrap();
        workspace.write_harness("print('hi')\n").await.unwrap();
        let root = workspace.root().to_path_buf();
        assert!(root.join("a").join("b").join("c.py").is_file());

        workspace.close();
        assert!(!root.exists());
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_drop_removes_tree() {
        let base = tempfile::tempdir().unwrap();
        let module: ModulePath = "solution".parse().unwrap();
        let root = {
            let workspace = Workspace::create(Some(base.path()), &module, "x = 1\n")
                .await
                .unwrap();
            workspace.root().to_path_buf()
        };
        assert!(!root.exists());
    }
}
