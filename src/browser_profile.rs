//! Browser profile directory management
//!
//! Every invocation runs in its own UUID-named profile directory. A seed
//! profile, when given, is copied in so the original is never mutated.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::utils::constants::PROFILE_DIR_PREFIX;

// =============================================================================
// BrowserProfile - RAII wrapper for profile directory
// =============================================================================

/// RAII wrapper for a per-invocation profile directory
///
/// Removes the directory on drop unless it was marked persistent.
#[derive(Debug)]
pub struct BrowserProfile {
    path: PathBuf,
    cleanup_on_drop: bool,
}

impl BrowserProfile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            cleanup_on_drop: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the directory after drop
    pub fn persist(&mut self) {
        self.cleanup_on_drop = false;
    }

    /// Release a transient directory to the caller for removal
    ///
    /// Returns `None` for a persistent profile, which stays on disk.
    #[must_use]
    pub fn into_removal_path(mut self) -> Option<PathBuf> {
        if !self.cleanup_on_drop {
            return None;
        }
        self.cleanup_on_drop = false;
        Some(std::mem::take(&mut self.path))
    }
}

impl Drop for BrowserProfile {
    fn drop(&mut self) {
        // Released through `into_removal_path`
        if self.path.as_os_str().is_empty() {
            return;
        }
        if !self.cleanup_on_drop {
            info!(target: "pagegraph::cleanup", "Keeping profile at {}", self.path.display());
            return;
        }
        if self.path.exists() {
            debug!(target: "pagegraph::cleanup", "Removing profile {}", self.path.display());
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!(
                    target: "pagegraph::cleanup",
                    "Failed to remove profile directory {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

// =============================================================================
// Profile Creation
// =============================================================================

/// Create a fresh profile directory under `base`
///
/// `create_dir` (not `create_dir_all`) so a name collision fails instead of
/// sharing a directory.
pub fn create_unique_profile_in(base: &Path) -> Result<BrowserProfile> {
    let path = base.join(format!("{}_{}", PROFILE_DIR_PREFIX, Uuid::new_v4()));

    std::fs::create_dir(&path)
        .with_context(|| format!("Failed to create profile directory: {}", path.display()))?;

    debug!(target: "pagegraph::session", "Created profile directory {}", path.display());
    Ok(BrowserProfile::new(path))
}

/// Prepare the profile for one invocation
///
/// With `seed`, its contents are copied into the new directory. With
/// `persist`, the directory survives the invocation.
pub fn prepare_profile(seed: Option<&Path>, persist: bool) -> Result<BrowserProfile> {
    let mut profile = create_unique_profile_in(&std::env::temp_dir())?;

    if let Some(seed) = seed {
        if !seed.is_dir() {
            anyhow::bail!("Existing profile is not a directory: {}", seed.display());
        }
        copy_dir_recursive(seed, profile.path())
            .with_context(|| format!("Failed to copy profile from {}", seed.display()))?;
        info!(
            target: "pagegraph::session",
            "Seeded profile {} from {}",
            profile.path().display(),
            seed.display()
        );
    }

    if persist {
        profile.persist();
    }
    Ok(profile)
}

// Singleton files name the owning process; a copied one would make the
// browser refuse to start.
const SINGLETON_FILES: &[&str] = &["SingletonLock", "SingletonCookie", "SingletonSocket"];

fn copy_dir_recursive(from: &Path, to: &Path) -> Result<()> {
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let name = entry.file_name();
        if SINGLETON_FILES.iter().any(|s| name == *s) {
            continue;
        }

        let source = entry.path();
        let target = to.join(&name);
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
            copy_dir_recursive(&source, &target)?;
        } else if file_type.is_file() {
            std::fs::copy(&source, &target)?;
        }
        // Symlinks are skipped
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_profile_removed_on_drop() {
        let base = tempfile::tempdir().unwrap();
        let profile = create_unique_profile_in(base.path()).unwrap();
        let path = profile.path().to_path_buf();
        assert!(path.exists());
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(PROFILE_DIR_PREFIX)
        );

        drop(profile);
        assert!(!path.exists());
    }

    #[test]
    fn test_persisted_profile_survives_drop() {
        let base = tempfile::tempdir().unwrap();
        let mut profile = create_unique_profile_in(base.path()).unwrap();
        profile.persist();
        let path = profile.path().to_path_buf();

        drop(profile);
        assert!(path.exists());
    }

    #[test]
    fn test_seed_copied_without_locks() {
        let seed = tempfile::tempdir().unwrap();
        std::fs::create_dir(seed.path().join("Default")).unwrap();
        std::fs::write(seed.path().join("Default/Preferences"), "{}").unwrap();
        std::fs::write(seed.path().join("SingletonLock"), "host-1").unwrap();

        let profile = prepare_profile(Some(seed.path()), false).unwrap();
        assert!(profile.path().join("Default/Preferences").exists());
        assert!(!profile.path().join("SingletonLock").exists());
        // Seed untouched
        assert!(seed.path().join("SingletonLock").exists());
    }

    #[test]
    fn test_missing_seed_is_an_error() {
        let missing = std::env::temp_dir().join(format!("no_such_profile_{}", Uuid::new_v4()));
        assert!(prepare_profile(Some(&missing), false).is_err());
    }
}
