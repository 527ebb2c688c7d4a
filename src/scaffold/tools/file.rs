//! File tools: read, write, and single-occurrence string replacement.
//!
//! Handled I/O failures come back as `Error reading ...` / `Error writing ...`
//! text. Only the final write in [`str_replace`] escapes as a [`ToolError`].

use serde::Deserialize;
use std::path::Path;
use tokio::fs;

use super::ToolError;

/// Parameters for the read_file tool.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadFileParams {
    /// Absolute path of the file to read.
    pub path: String,
}

/// Parameters for the write_file tool.
#[derive(Debug, Clone, Deserialize)]
pub struct WriteFileParams {
    /// Path of the file to create or overwrite.
    pub path: String,
    /// Full new content of the file.
    pub content: String,
}

/// Parameters for the str_replace tool.
#[derive(Debug, Clone, Deserialize)]
pub struct StrReplaceParams {
    /// Path of the file to edit.
    pub path: String,
    /// Exact text to find; must occur once.
    pub old_str: String,
    /// Replacement text.
    pub new_str: String,
}

/// Read an entire file as UTF-8 text.
pub async fn read_file(path: &str) -> String {
    match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => format!("Error reading {}: {}", path, e),
    }
}

/// Create or overwrite `path`, creating parent directories as needed.
pub async fn write_file(path: &str, content: &str) -> String {
    match write_with_parents(path, content).await {
        Ok(()) => format!("Wrote {} bytes to {}", content.len(), path),
        Err(e) => format!("Error writing {}: {}", path, e),
    }
}

async fn write_with_parents(path: &str, content: &str) -> std::io::Result<()> {
    let parent = Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).await?;
    fs::write(path, content).await
}

/// Replace the single occurrence of `old_str` in `path` with `new_str`.
///
/// The file is left untouched unless `old_str` occurs exactly once.
pub async fn str_replace(path: &str, old_str: &str, new_str: &str) -> Result<String, ToolError> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => return Ok(format!("Error reading {}: {}", path, e)),
    };

    let count = content.matches(old_str).count();
    if count == 0 {
        return Ok(format!("Error: old_str not found in {}", path));
    }
    if count > 1 {
        return Ok(format!(
            "Error: old_str appears {} times in {} (must be exactly 1)",
            count, path
        ));
    }

    let updated = content.replacen(old_str, new_str, 1);
    fs::write(path, updated).await?;
    Ok(format!("Replaced 1 occurrence in {}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scratch(dir: &TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = scratch(&dir, "a/b/c.txt");
        let content = "line one\nline two\n\tunicode: é\n";

        let wrote = write_file(&path, content).await;
        assert_eq!(wrote, format!("Wrote {} bytes to {}", content.len(), path));
        assert_eq!(read_file(&path).await, content);
    }

    #[tokio::test]
    async fn test_write_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = scratch(&dir, "f.txt");
        write_file(&path, "first version").await;
        write_file(&path, "second").await;
        assert_eq!(read_file(&path).await, "second");
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = scratch(&dir, "missing.txt");
        let result = read_file(&path).await;
        assert!(result.starts_with(&format!("Error reading {}: ", path)));
    }

    #[tokio::test]
    async fn test_write_into_file_as_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = scratch(&dir, "blocker");
        std::fs::write(&blocker, "x").unwrap();
        let path = format!("{}/child.txt", blocker);

        let result = write_file(&path, "data").await;
        assert!(result.starts_with(&format!("Error writing {}: ", path)));
    }

    #[tokio::test]
    async fn test_str_replace_single_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        let path = scratch(&dir, "src.py");
        std::fs::write(&path, "def a():\n    return 1\n\ndef b():\n    return 2\n").unwrap();

        let result = str_replace(&path, "return 1", "return 10").await.unwrap();
        assert_eq!(result, format!("Replaced 1 occurrence in {}", path));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "def a():\n    return 10\n\ndef b():\n    return 2\n"
        );
    }

    #[tokio::test]
    async fn test_str_replace_not_found_leaves_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = scratch(&dir, "f.txt");
        std::fs::write(&path, "alpha beta").unwrap();

        let result = str_replace(&path, "Alpha", "gamma").await.unwrap();
        assert_eq!(result, format!("Error: old_str not found in {}", path));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "alpha beta");
    }

    #[tokio::test]
    async fn test_str_replace_multiple_occurrences_names_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = scratch(&dir, "f.txt");
        std::fs::write(&path, "x = 1\nx = 1\nx = 1\n").unwrap();

        let result = str_replace(&path, "x = 1", "x = 2").await.unwrap();
        assert_eq!(
            result,
            format!("Error: old_str appears 3 times in {} (must be exactly 1)", path)
        );
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "x = 1\nx = 1\nx = 1\n"
        );
    }

    #[tokio::test]
    async fn test_str_replace_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = scratch(&dir, "nope.txt");
        let result = str_replace(&path, "a", "b").await.unwrap();
        assert!(result.starts_with(&format!("Error reading {}: ", path)));
    }
}
