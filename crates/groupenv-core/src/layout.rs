//! On-disk layout of one group.
//!
//! ```text
//! <home>/group/<name>/lib/                 user-managed archives (removable)
//! <home>/group/<name>/lib/pom.xml          dependency manifest
//! <home>/group/<name>/lib/target/...       build-tool managed archives
//! <home>/group/<name>/resource/components.json
//! ```

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::config::EnvConfig;

/// File name of the wiring descriptor under `resource/`.
pub const DESCRIPTOR_FILE: &str = "components.json";

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("group name must not be empty")]
    EmptyGroupName,

    #[error("group name '{0}' must be a single plain path segment")]
    InvalidGroupName(String),
}

/// Derived, immutable paths for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLayout {
    pub group: String,
    pub root: PathBuf,
    pub library_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub managed_dir: PathBuf,
    pub descriptor_path: PathBuf,
}

impl GroupLayout {
    /// Build the layout for `group` under the configured home.
    ///
    /// Relative homes are resolved against the current directory so every
    /// derived path is absolute.
    pub fn new(cfg: &EnvConfig, group: &str) -> Result<Self, LayoutError> {
        validate_group_name(group)?;
        let home = absolutize(&cfg.paths.home);
        let root = home.join("group").join(group);
        let library_dir = root.join("lib");
        Ok(Self {
            group: group.to_string(),
            manifest_path: library_dir.join(&cfg.build_tool.manifest_file),
            managed_dir: library_dir.join(&cfg.build_tool.managed_subdir),
            descriptor_path: root.join("resource").join(DESCRIPTOR_FILE),
            library_dir,
            root,
        })
    }

    /// Absolute form of `path` when it names an entry directly in the library
    /// directory (the user-managed area).
    ///
    /// `..` segments are refused rather than normalized: the OS resolves them
    /// after following symlinks, so a lexically clean path may point elsewhere.
    pub fn user_managed_path(&self, path: &Path) -> Option<PathBuf> {
        if path.components().any(|c| c == Component::ParentDir) {
            return None;
        }
        let path = absolutize(path);
        (path.parent() == Some(self.library_dir.as_path())).then_some(path)
    }

    /// Whether `path` sits directly in the library directory.
    pub fn is_user_managed(&self, path: &Path) -> bool {
        self.user_managed_path(path).is_some()
    }

    /// Whether `path` is inside the build-tool managed subdirectory.
    pub fn is_tool_managed(&self, path: &Path) -> bool {
        absolutize(path).starts_with(&self.managed_dir)
    }
}

fn validate_group_name(group: &str) -> Result<(), LayoutError> {
    if group.trim().is_empty() {
        return Err(LayoutError::EmptyGroupName);
    }
    let mut components = Path::new(group).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(LayoutError::InvalidGroupName(group.to_string())),
    }
}

/// Make `path` absolute and lexically normalized without touching the filesystem.
pub fn absolutize(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    let mut out = PathBuf::new();
    for comp in joined.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let cfg = EnvConfig::with_home("/srv/groupenv");
        let layout = GroupLayout::new(&cfg, "alpha").unwrap();
        assert_eq!(layout.library_dir, PathBuf::from("/srv/groupenv/group/alpha/lib"));
        assert_eq!(layout.manifest_path, PathBuf::from("/srv/groupenv/group/alpha/lib/pom.xml"));
        assert_eq!(layout.managed_dir, PathBuf::from("/srv/groupenv/group/alpha/lib/target"));
        assert_eq!(
            layout.descriptor_path,
            PathBuf::from("/srv/groupenv/group/alpha/resource/components.json")
        );
    }

    #[test]
    fn test_rejects_traversal_names() {
        let cfg = EnvConfig::with_home("/srv/groupenv");
        assert!(matches!(GroupLayout::new(&cfg, ""), Err(LayoutError::EmptyGroupName)));
        assert!(GroupLayout::new(&cfg, "..").is_err());
        assert!(GroupLayout::new(&cfg, "a/b").is_err());
        assert!(GroupLayout::new(&cfg, "/abs").is_err());
    }

    #[test]
    fn test_user_and_tool_managed_areas() {
        let cfg = EnvConfig::with_home("/srv/groupenv");
        let layout = GroupLayout::new(&cfg, "alpha").unwrap();
        let direct = layout.library_dir.join("x.so");
        let nested = layout.managed_dir.join("dependency").join("y.so");
        assert!(layout.is_user_managed(&direct));
        assert!(!layout.is_tool_managed(&direct));
        assert!(!layout.is_user_managed(&nested));
        assert!(layout.is_tool_managed(&nested));
        assert!(!layout.is_user_managed(&layout.library_dir.join("sub/../z.so")));
        assert!(!layout.is_user_managed(&layout.library_dir.join("../lib/z.so")));
        assert_eq!(
            layout.user_managed_path(&layout.library_dir.join("./z.so")),
            Some(layout.library_dir.join("z.so"))
        );
    }
}
