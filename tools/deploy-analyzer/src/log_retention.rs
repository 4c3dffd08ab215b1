use crate::errors::AnalyzerError;
use std::fs;
use std::path::{Path, PathBuf};

/// Active segments are rotated once they reach this fraction of the budget.
const SEGMENTS_PER_BUDGET: u64 = 4;

/// The files a run log owns: the active `<stem>.<ext>` and the rotated
/// `<stem>.<n>.<ext>` segments beside it. Nothing else in the directory is
/// ever counted, renamed or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLogSegments {
    active: PathBuf,
    dir: PathBuf,
    stem: String,
    suffix: String,
}

impl RunLogSegments {
    pub fn for_active(active: &Path) -> Result<Self, AnalyzerError> {
        let stem = active
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| {
                AnalyzerError::Io(format!("run log path has no file name: {}", active.display()))
            })?;
        let suffix = active
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let dir = match active.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(Self {
            active: active.to_path_buf(),
            dir,
            stem: stem.to_string(),
            suffix,
        })
    }

    pub fn segment_limit(budget_bytes: u64) -> u64 {
        (budget_bytes / SEGMENTS_PER_BUDGET).max(1)
    }

    /// Rotated segments, oldest (lowest sequence number) first.
    pub fn rotated(&self) -> Result<Vec<(u64, PathBuf)>, AnalyzerError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AnalyzerError::Io(e.to_string())),
        };
        let mut segments = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                let sequence = self.sequence_of(&name)?;
                let path = entry.path();
                path.is_file().then_some((sequence, path))
            })
            .collect::<Vec<_>>();
        segments.sort_by_key(|(sequence, _)| *sequence);
        Ok(segments)
    }

    fn sequence_of(&self, file_name: &str) -> Option<u64> {
        file_name
            .strip_prefix(self.stem.as_str())?
            .strip_prefix('.')?
            .strip_suffix(self.suffix.as_str())?
            .parse()
            .ok()
    }

    /// Moves the active log aside when appending `incoming` bytes would push
    /// it past the segment limit. Returns the rotated path, if any.
    pub fn rotate_if_full(
        &self,
        incoming: u64,
        budget_bytes: u64,
    ) -> Result<Option<PathBuf>, AnalyzerError> {
        let current = file_len(&self.active);
        if current == 0 || current + incoming <= Self::segment_limit(budget_bytes) {
            return Ok(None);
        }
        let next = self
            .rotated()?
            .last()
            .map_or(1, |(sequence, _)| sequence + 1);
        let target = self.dir.join(format!("{}.{next}{}", self.stem, self.suffix));
        fs::rename(&self.active, &target).map_err(|e| AnalyzerError::Io(e.to_string()))?;
        Ok(Some(target))
    }

    /// Deletes the oldest rotated segments until the active log plus the
    /// remaining segments fit `budget_bytes`. The active log is kept.
    pub fn prune_to_budget(&self, budget_bytes: u64) -> Result<Vec<PathBuf>, AnalyzerError> {
        let rotated = self.rotated()?;
        let mut total = file_len(&self.active)
            + rotated.iter().map(|(_, path)| file_len(path)).sum::<u64>();
        let mut deleted = Vec::new();
        for (_, path) in rotated {
            if total <= budget_bytes {
                break;
            }
            let len = file_len(&path);
            fs::remove_file(&path).map_err(|e| AnalyzerError::Io(e.to_string()))?;
            total = total.saturating_sub(len);
            deleted.push(path);
        }
        Ok(deleted)
    }
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).map(|meta| meta.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::RunLogSegments;
    use std::fs;

    #[test]
    fn only_numbered_siblings_of_the_active_log_are_segments() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in [
            "run.1.jsonl",
            "run.7.jsonl",
            "run.jsonl.bak",
            "run.old.jsonl",
            "runner.2.jsonl",
            "run.3.txt",
            "notes.md",
        ] {
            fs::write(dir.path().join(name), "x").expect("write");
        }
        let segments = RunLogSegments::for_active(&dir.path().join("run.jsonl")).expect("segments");
        let sequences: Vec<u64> = segments
            .rotated()
            .expect("rotated")
            .into_iter()
            .map(|(sequence, _)| sequence)
            .collect();
        assert_eq!(sequences, vec![1, 7]);
    }

    #[test]
    fn pruning_leaves_unrelated_files_and_the_active_log_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let thesis = dir.path().join("thesis.docx");
        fs::write(&thesis, vec![0u8; 500]).expect("thesis");
        fs::write(dir.path().join("run.1.jsonl"), vec![0u8; 40]).expect("seg 1");
        fs::write(dir.path().join("run.2.jsonl"), vec![0u8; 40]).expect("seg 2");
        let active = dir.path().join("run.jsonl");
        fs::write(&active, vec![0u8; 80]).expect("active");

        let segments = RunLogSegments::for_active(&active).expect("segments");
        let deleted = segments.prune_to_budget(100).expect("pruned");

        assert_eq!(deleted.len(), 2);
        assert!(deleted[0].ends_with("run.1.jsonl"));
        assert!(active.exists());
        assert!(thesis.exists());
    }

    #[test]
    fn rotation_numbers_segments_after_the_newest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let active = dir.path().join("run.jsonl");
        fs::write(dir.path().join("run.4.jsonl"), "old").expect("seg");
        fs::write(&active, vec![0u8; 30]).expect("active");
        let segments = RunLogSegments::for_active(&active).expect("segments");

        assert_eq!(segments.rotate_if_full(5, 400).expect("fits"), None);
        let rotated = segments.rotate_if_full(5, 100).expect("rotated");
        assert_eq!(rotated, Some(dir.path().join("run.5.jsonl")));
        assert!(!active.exists());
    }

    #[test]
    fn extensionless_logs_use_bare_sequence_suffixes() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("events.2"), "x").expect("seg");
        fs::write(dir.path().join("events.log"), "x").expect("other");
        let segments = RunLogSegments::for_active(&dir.path().join("events")).expect("segments");
        let rotated = segments.rotated().expect("rotated");
        assert_eq!(rotated.len(), 1);
        assert_eq!(rotated[0].0, 2);
    }
}
