use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use ignore::{DirEntry, Walk, WalkBuilder};
use sha2::{Digest, Sha256};

/// Walks `root` verbatim: no ignore files, hidden entries included, sorted
/// by file name so results are deterministic.
pub fn walk(root: &Path) -> Walk {
    WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build()
}

/// Lists the immediate children of `dir` in file-name order.
pub fn children(dir: &Path) -> io::Result<Vec<DirEntry>> {
    let mut entries = Vec::new();
    for entry in WalkBuilder::new(dir)
        .standard_filters(false)
        .max_depth(Some(1))
        .sort_by_file_name(|a, b| a.cmp(b))
        .build()
    {
        let entry = entry.map_err(walk_error)?;
        if entry.depth() == 0 {
            continue;
        }
        entries.push(entry);
    }
    Ok(entries)
}

pub fn walk_error(err: ignore::Error) -> io::Error {
    let message = err.to_string();
    err.into_io_error()
        .unwrap_or_else(|| io::Error::other(message))
}

pub fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Copies `src` (a file or a directory tree) to `dst`, creating parents.
/// Empty subdirectories are reproduced and symlinks inside a tree are
/// copied as links, not followed.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    if !src.is_dir() {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst)?;
        return Ok(());
    }

    for entry in walk(src) {
        let entry = entry.map_err(walk_error)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|err| io::Error::other(err.to_string()))?;
        let target = dst.join(relative);

        match entry.file_type() {
            Some(kind) if kind.is_dir() => fs::create_dir_all(&target)?,
            Some(kind) if kind.is_symlink() => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                copy_link(entry.path(), &target)?;
            }
            _ => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(entry.path(), &target)?;
            }
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_link(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(src)?, dst)
}

#[cfg(not(unix))]
fn copy_link(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst).map(|_| ())
}

/// Removes a file or a whole directory tree.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Builds new content in a hidden sibling of `destination` and moves it
/// into place only once `build` succeeds. On failure the sibling is
/// removed and `destination` is untouched.
pub fn replace_with(
    destination: &Path,
    build: impl FnOnce(&Path) -> io::Result<()>,
) -> io::Result<()> {
    let (Some(parent), Some(name)) = (destination.parent(), destination.file_name()) else {
        return Err(io::Error::other(format!(
            "{} has no parent directory",
            destination.display()
        )));
    };
    let staged = parent.join(format!(".{}.kitwright-tmp", name.to_string_lossy()));

    fs::create_dir_all(parent)?;
    discard(&staged)?;

    let result = build(&staged).and_then(|()| {
        discard(destination)?;
        fs::rename(&staged, destination)
    });
    if result.is_err() {
        if let Err(err) = discard(&staged) {
            tracing::warn!("could not remove {}: {err}", staged.display());
        }
    }
    result
}

fn discard(path: &Path) -> io::Result<()> {
    if path.symlink_metadata().is_ok() {
        remove_path(path)?;
    }
    Ok(())
}

/// SHA-256 of a file, or of every relative path and file body in a tree.
/// Symlinks hash their link text.
pub fn digest_path(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();

    if path.is_dir() {
        for entry in walk(path) {
            let entry = entry.map_err(walk_error)?;
            let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
            let relative = relative.to_string_lossy().replace('\\', "/");
            match entry.file_type() {
                Some(kind) if kind.is_dir() => {
                    hasher.update(b"d:");
                    hasher.update(relative.as_bytes());
                }
                Some(kind) if kind.is_symlink() => {
                    hasher.update(b"l:");
                    hasher.update(relative.as_bytes());
                    hasher.update(b"\0");
                    let link = fs::read_link(entry.path())?;
                    hasher.update(link.to_string_lossy().as_bytes());
                }
                _ => {
                    hasher.update(b"f:");
                    hasher.update(relative.as_bytes());
                    hasher.update(b"\0");
                    hasher.update(fs::read(entry.path())?);
                }
            }
            hasher.update(b"\n");
        }
    } else {
        hasher.update(fs::read(path)?);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// True when `path` is relative and never climbs out of the directory it
/// is joined onto.
pub fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|segment| matches!(segment, Component::Normal(_) | Component::CurDir))
}

/// Removes `start` and its ancestors while they are empty directories,
/// stopping at the first non-empty one and never touching `stop` or
/// anything above it.
pub fn prune_empty_ancestors(start: &Path, stop: &Path) -> io::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    let mut current = Some(start);

    while let Some(dir) = current {
        if dir == stop || !dir.starts_with(stop) {
            break;
        }
        if !dir.is_dir() {
            current = dir.parent();
            continue;
        }
        if fs::read_dir(dir)?.next().is_some() {
            break;
        }
        fs::remove_dir(dir)?;
        removed.push(dir.to_path_buf());
        current = dir.parent();
    }

    Ok(removed)
}

/// Relative path rendered with `/` separators, as stored in records.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|segment| segment.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_tree(root: &Path) {
        fs::create_dir_all(root.join("references")).unwrap();
        fs::create_dir_all(root.join("assets/empty")).unwrap();
        fs::write(root.join("SKILL.md"), "---\nname: s\n---\n").unwrap();
        fs::write(root.join("references/x.md"), "ref").unwrap();
    }

    #[test]
    fn copy_tree_reproduces_empty_directories() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("out/dst");
        sample_tree(&src);

        copy_tree(&src, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("references/x.md")).unwrap(), "ref");
        assert!(dst.join("assets/empty").is_dir());
    }

    #[test]
    fn copy_tree_copies_single_files() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.md");
        fs::write(&src, "agent").unwrap();

        copy_tree(&src, &tmp.path().join("deep/b.md")).unwrap();
        assert_eq!(
            fs::read_to_string(tmp.path().join("deep/b.md")).unwrap(),
            "agent"
        );
    }

    #[test]
    fn digest_changes_when_tree_content_changes() {
        let tmp = TempDir::new().unwrap();
        sample_tree(tmp.path());
        let before = digest_path(tmp.path()).unwrap();
        assert_eq!(before, digest_path(tmp.path()).unwrap());

        fs::write(tmp.path().join("references/x.md"), "edited").unwrap();
        assert_ne!(before, digest_path(tmp.path()).unwrap());
    }

    #[test]
    fn prune_stops_at_non_empty_ancestor() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path();
        fs::create_dir_all(base.join("root/a/b/c")).unwrap();
        fs::write(base.join("root/keep.md"), "x").unwrap();

        let removed = prune_empty_ancestors(&base.join("root/a/b/c"), base).unwrap();

        assert_eq!(removed.len(), 3);
        assert!(!base.join("root/a").exists());
        assert!(base.join("root/keep.md").exists());
    }

    #[test]
    fn prune_never_removes_the_stop_directory() {
        let tmp = TempDir::new().unwrap();
        let stop = tmp.path().join("base");
        fs::create_dir_all(stop.join("empty")).unwrap();

        prune_empty_ancestors(&stop.join("empty"), &stop).unwrap();

        assert!(stop.is_dir());
        assert!(!stop.join("empty").exists());
    }

    #[test]
    fn children_are_sorted_and_exclude_root() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("b")).unwrap();
        fs::create_dir(tmp.path().join("a")).unwrap();

        let names: Vec<_> = children(tmp.path())
            .unwrap()
            .into_iter()
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[cfg(unix)]
    #[test]
    fn copy_tree_keeps_dangling_links_as_links() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        sample_tree(&src);
        std::os::unix::fs::symlink("missing.md", src.join("references/gone.md")).unwrap();
        let dst = tmp.path().join("dst");

        copy_tree(&src, &dst).unwrap();

        let link = dst.join("references/gone.md");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("missing.md"));
        assert_eq!(digest_path(&src).unwrap(), digest_path(&dst).unwrap());
    }

    #[test]
    fn containment_rejects_absolute_and_parent_segments() {
        assert!(is_contained(Path::new("agents/a.md")));
        assert!(is_contained(Path::new("./skills/s")));
        assert!(!is_contained(Path::new("../outside.md")));
        assert!(!is_contained(Path::new("skills/../../x")));
        assert!(!is_contained(Path::new("/etc/passwd")));
    }

    #[test]
    fn replace_with_leaves_destination_alone_on_failure() {
        let tmp = TempDir::new().unwrap();
        let dst = tmp.path().join("skills/s");
        sample_tree(&dst);

        let err = replace_with(&dst, |staged| {
            fs::create_dir_all(staged)?;
            fs::write(staged.join("half.md"), "partial")?;
            Err(io::Error::other("copy failed"))
        })
        .unwrap_err();

        assert_eq!(err.to_string(), "copy failed");
        assert_eq!(fs::read_to_string(dst.join("references/x.md")).unwrap(), "ref");
        assert!(!dst.join("half.md").exists());
        assert_eq!(children(&tmp.path().join("skills")).unwrap().len(), 1);
    }

    #[test]
    fn replace_with_swaps_a_file_for_a_directory() {
        let tmp = TempDir::new().unwrap();
        let dst = tmp.path().join("skills/s");
        fs::create_dir_all(tmp.path().join("skills")).unwrap();
        fs::write(&dst, "was a file").unwrap();

        replace_with(&dst, |staged| {
            copy_tree(&tmp.path().join("skills/s"), &staged.join("SKILL.md"))
        })
        .unwrap();

        assert_eq!(fs::read_to_string(dst.join("SKILL.md")).unwrap(), "was a file");
    }
}
