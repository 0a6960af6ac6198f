use std::{
    fs::{File, create_dir, rename},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use log::debug;
use rustix::fs::{Mode, chmod};

/// Create `path` and any missing parents, applying `mode` to the ones created.
pub fn mkdir_p<P: AsRef<Path>>(path: P, mode: Mode) -> Result<()> {
    let path = path.as_ref();
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow!("path {:?} is not valid UTF-8", path))?;
    for dir in descending_dirs(path_str) {
        match create_dir(&dir) {
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => (),
            Err(e) => return Err(anyhow!("unable to create directory {}: {}", dir, e)),
            Ok(_) => {
                debug!("Created directory {}", &dir);
                chmod(&dir, mode)
                    .map_err(|e| anyhow!("unable to change mode of {}: {}", dir, e))?;
            }
        }
    }
    Ok(())
}

// Given a path, return a list of it and its parents in descending order.
// For example, "/a/b/c", returns the Vector ["/a", "/a/b", "/a/b/c"].
fn descending_dirs(path: &str) -> Vec<String> {
    let dirs = path.split('/').collect::<Vec<&str>>();
    (1..=dirs.len())
        .map(|i| dirs[..i].join("/"))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Write through a hidden temporary file in the same directory, then rename
/// it over `path` so readers never see a partial file.
pub fn atomic_write<P: AsRef<Path>>(
    path: P,
    write: impl FnOnce(&File) -> Result<()>,
) -> Result<()> {
    let p = path.as_ref();
    let p_str = p.to_string_lossy();

    let dir_name = match p.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        Some(_) => Path::new("."),
        None => return Err(anyhow!("invalid path {}", p_str)),
    };
    let file_name = p
        .file_name()
        .ok_or_else(|| anyhow!("invalid path {}", p_str))?;
    let file_name_tmp = dir_name.join(format!(".{}.tmp", file_name.to_string_lossy()));

    {
        let f = File::create(&file_name_tmp)
            .context(format!("unable to create {}", file_name_tmp.to_string_lossy()))?;
        write(&f).context(format!("unable to write {}", p_str))?;
        f.sync_all().context(format!("unable to sync {}", p_str))?;
    }

    rename(&file_name_tmp, p).context(format!(
        "unable to rename {} to {}",
        file_name_tmp.to_string_lossy(),
        p_str
    ))?;
    let dir_name_str = dir_name.to_string_lossy();
    let dir = File::open(dir_name).context(format!("unable to open directory {}", dir_name_str))?;
    dir.sync_all()
        .context(format!("unable to sync directory {}", dir_name_str))
}

#[cfg(test)]
mod test {
    use std::io::Write;
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "link-fallback-fs-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_descending_dirs() {
        struct Case<'a> {
            path: &'a str,
            expected: Vec<&'a str>,
        }
        let cases = [
            Case {
                path: "",
                expected: vec![],
            },
            Case {
                path: "a",
                expected: vec!["a"],
            },
            Case {
                path: "/run/link-fallback",
                expected: vec!["/run", "/run/link-fallback"],
            },
            Case {
                path: "/a/b/c/d",
                expected: vec!["/a", "/a/b", "/a/b/c", "/a/b/c/d"],
            },
        ];
        for case in cases {
            assert_eq!(case.expected, descending_dirs(case.path));
        }
    }

    #[test]
    fn test_mkdir_p_then_atomic_write() {
        let dir = scratch_dir("write");
        let nested = dir.join("state/run");
        mkdir_p(&nested, Mode::from(0o755)).unwrap();
        // Existing directories are fine.
        mkdir_p(&nested, Mode::from(0o755)).unwrap();

        let target = nested.join("status.json");
        atomic_write(&target, |mut f| {
            f.write_all(b"first")?;
            Ok(())
        })
        .unwrap();
        atomic_write(&target, |mut f| {
            f.write_all(b"second")?;
            Ok(())
        })
        .unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "second");
        assert!(!nested.join(".status.json.tmp").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_atomic_write_error_keeps_target() {
        let dir = scratch_dir("error");
        mkdir_p(&dir, Mode::from(0o755)).unwrap();
        let target = dir.join("status.json");
        std::fs::write(&target, "kept").unwrap();

        let result = atomic_write(&target, |_| Err(anyhow!("boom")));
        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "kept");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
