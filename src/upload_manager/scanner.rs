use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// 待上传的本地文件与其对应的远程相对目录（以 `/` 分隔）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalEntry {
    pub path: PathBuf,
    pub remote_dir: String,
    pub size: u64,
}

/// 单个文件直接上传到目标目录；目录则连同目录名一起递归映射。
/// 结果按路径排序，保证上传顺序稳定。
pub fn scan_local(root: &Path) -> Result<Vec<LocalEntry>> {
    let metadata = fs::metadata(root)?;
    if metadata.is_file() {
        return Ok(vec![LocalEntry {
            path: root.to_path_buf(),
            remote_dir: String::new(),
            size: metadata.len(),
        }]);
    }

    let base = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut entries = Vec::new();
    walk_dir(root, &base, &mut entries)?;
    Ok(entries)
}

fn walk_dir(current: &Path, remote_dir: &str, entries: &mut Vec<LocalEntry>) -> Result<()> {
    let mut children: Vec<_> = fs::read_dir(current)?.collect::<std::io::Result<_>>()?;
    children.sort_by_key(|entry| entry.file_name());

    for entry in children {
        let path = entry.path();
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let nested = join_remote(remote_dir, &name);
            walk_dir(&path, &nested, entries)?;
        } else if metadata.is_file() {
            entries.push(LocalEntry {
                path,
                remote_dir: remote_dir.to_string(),
                size: metadata.len(),
            });
        }
    }
    Ok(())
}

/// 拼接远程路径，忽略空段与多余的分隔符。
pub fn join_remote(base: &str, child: &str) -> String {
    base.split(['/', '\\'])
        .chain(child.split(['/', '\\']))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
