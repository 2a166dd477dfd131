use chrono::{Datelike, NaiveDate};
use std::path::{Component, Path, PathBuf};

/// `<root>/<YYYY>/<MM>/snapshot_<YYYY-MM-DD>.<ext>`
pub fn snapshot_path(root: &Path, date: NaiveDate, extension: &str) -> PathBuf {
    root.join(format!("{:04}", date.year()))
        .join(format!("{:02}", date.month()))
        .join(format!("snapshot_{}.{extension}", date.format("%Y-%m-%d")))
}

/// Mirrors `source` from under `source_root` into `dest_root`, swapping the
/// extension. Paths outside `source_root` keep their last three components.
pub fn mirror_path(
    source_root: &Path,
    dest_root: &Path,
    source: &Path,
    target_extension: &str,
) -> PathBuf {
    let relative = match source.strip_prefix(source_root) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => {
            let normal: Vec<_> = source
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part),
                    _ => None,
                })
                .collect();
            let start = normal.len().saturating_sub(3);
            normal[start..].iter().collect()
        }
    };
    dest_root.join(relative).with_extension(target_extension)
}

/// Recovers the trading date from a `snapshot_<YYYY-MM-DD>.*` file name.
pub fn date_from_snapshot_name(path: &Path) -> Option<NaiveDate> {
    let stem = path.file_stem()?.to_str()?;
    let date = stem.strip_prefix("snapshot_")?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}
