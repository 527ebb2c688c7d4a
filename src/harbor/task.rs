//! Task directories on the host.
//!
//! Layout: `<dataset>/<name>/instruction.md`, plus optional `environment/`
//! (starting files) and `tests/` (grading fixtures, never uploaded here).

use std::path::{Path, PathBuf};

use crate::error::TaskError;

pub const INSTRUCTION_FILE: &str = "instruction.md";
pub const ENVIRONMENT_DIR: &str = "environment";
pub const TESTS_DIR: &str = "tests";

/// One benchmark task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInstance {
    pub name: String,
    pub dir: PathBuf,
    pub instruction_path: PathBuf,
    pub environment_dir: Option<PathBuf>,
    pub tests_dir: Option<PathBuf>,
}

impl TaskInstance {
    /// Load the task rooted at `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, TaskError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(TaskError::NotFound(dir.display().to_string()));
        }

        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());

        let instruction_path = dir.join(INSTRUCTION_FILE);
        if !instruction_path.is_file() {
            return Err(TaskError::MissingInstruction {
                task: name,
                path: instruction_path.display().to_string(),
            });
        }

        let optional_dir = |child: &str| {
            let path = dir.join(child);
            path.is_dir().then_some(path)
        };

        Ok(Self {
            name,
            dir: dir.to_path_buf(),
            instruction_path,
            environment_dir: optional_dir(ENVIRONMENT_DIR),
            tests_dir: optional_dir(TESTS_DIR),
        })
    }

    pub fn instruction(&self) -> Result<String, TaskError> {
        Ok(std::fs::read_to_string(&self.instruction_path)?)
    }
}

/// Tasks under `dataset`, sorted by name.
///
/// Directories whose name starts with `_` or `.` are templates and skipped.
/// A non-empty `filter` keeps only the named tasks and fails when none match.
pub fn discover_tasks(dataset: &Path, filter: &[String]) -> Result<Vec<TaskInstance>, TaskError> {
    if !dataset.is_dir() {
        return Err(TaskError::NotFound(dataset.display().to_string()));
    }

    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dataset)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('_') || name.starts_with('.') {
            continue;
        }
        if !filter.is_empty() && !filter.iter().any(|f| f == &name) {
            continue;
        }
        dirs.push(entry.path());
    }
    dirs.sort();

    let tasks = dirs
        .iter()
        .map(TaskInstance::load)
        .collect::<Result<Vec<_>, _>>()?;

    if tasks.is_empty() && !filter.is_empty() {
        return Err(TaskError::NoMatchingTasks(filter.join(", ")));
    }
    tracing::debug!(dataset = %dataset.display(), count = tasks.len(), "Discovered tasks");
    Ok(tasks)
}
