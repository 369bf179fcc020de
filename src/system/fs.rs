//! Local filesystem access

use super::users;
use anyhow::{Context, Result, bail};
use declarative::FileSystem;
use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt, lchown, symlink};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Mode for files that did not exist before
const NEW_FILE_MODE: u32 = 0o644;

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

/// Treat "not found" as `None`
fn optional<T>(result: std::io::Result<T>) -> std::io::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn ensure_parent(path: &Path) -> Result<&Path> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create {}", parent.display()))?;
    Ok(parent)
}

impl FileSystem for LocalFs {
    fn read_to_string(&self, path: &Path) -> Result<Option<String>> {
        optional(fs::read_to_string(path))
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> Result<()> {
        let parent = ensure_parent(path)?;
        let existing = optional(fs::metadata(path))
            .with_context(|| format!("Failed to stat {}", path.display()))?;

        let mut file = NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
        file.write_all(contents.as_bytes())?;
        file.as_file().sync_all()?;

        match &existing {
            Some(meta) => {
                file.as_file().set_permissions(meta.permissions())?;
                // Best effort; only root can give files away
                if let Err(e) = lchown(file.path(), Some(meta.uid()), Some(meta.gid())) {
                    log::debug!("could not keep owner of {}: {e}", path.display());
                }
            }
            None => file
                .as_file()
                .set_permissions(fs::Permissions::from_mode(NEW_FILE_MODE))?,
        }

        file.persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn owner(&self, path: &Path) -> Result<Option<String>> {
        let meta = optional(fs::symlink_metadata(path))
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        Ok(meta.map(|m| users::user_name(m.uid()).unwrap_or_else(|| m.uid().to_string())))
    }

    fn chown(&self, path: &Path, owner: &str, group: Option<&str>, recursive: bool) -> Result<()> {
        let Some((uid, primary_gid)) = users::user_ids(owner)? else {
            bail!("unknown user {owner}");
        };
        let gid = match group {
            Some(group) => match users::group_id(group)? {
                Some(gid) => gid,
                None => bail!("unknown group {group}"),
            },
            None => primary_gid,
        };

        let walker = WalkDir::new(path).follow_links(false);
        let walker = if recursive { walker } else { walker.max_depth(0) };
        for entry in walker {
            let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
            lchown(entry.path(), Some(uid), Some(gid))
                .with_context(|| format!("Failed to chown {}", entry.path().display()))?;
        }
        Ok(())
    }

    fn read_link(&self, path: &Path) -> Result<Option<PathBuf>> {
        let meta = optional(fs::symlink_metadata(path))
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        match meta {
            Some(meta) if meta.file_type().is_symlink() => Ok(Some(
                fs::read_link(path)
                    .with_context(|| format!("Failed to read link {}", path.display()))?,
            )),
            _ => Ok(None),
        }
    }

    fn symlink(&self, source: &Path, link: &Path) -> Result<()> {
        ensure_parent(link)?;
        symlink(source, link).with_context(|| {
            format!("Failed to link {} -> {}", link.display(), source.display())
        })
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        optional(fs::remove_file(path))
            .with_context(|| format!("Failed to remove {}", path.display()))?;
        Ok(())
    }
}
