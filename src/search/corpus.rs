use anyhow::{Context, Result};
use std::path::Path;

/// Read-only store of knowledge lines, loaded once before serving.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    lines: Vec<String>,
}

impl Corpus {
    /// Build a corpus from raw lines, skipping blank ones. Other lines are kept verbatim.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines = lines
            .into_iter()
            .map(Into::<String>::into)
            .filter(|l| !l.trim().is_empty())
            .collect();
        Self { lines }
    }

    /// Load a line-delimited UTF-8 file. An unreadable file or one with no
    /// non-blank lines is an error: the service must not start without a corpus.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read corpus file {}", path.display()))?;
        let corpus = Self::from_lines(data.lines());
        if corpus.is_empty() {
            anyhow::bail!("Corpus file {} has no non-empty lines", path.display());
        }
        Ok(corpus)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_lines_drops_blank_lines() {
        let corpus = Corpus::from_lines(["a", "", "   ", "\t", "b "]);
        assert_eq!(corpus.lines(), &["a".to_string(), "b ".to_string()]);
    }

    #[test]
    fn test_load_handles_crlf() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "第一行\r\n\r\n第二行\r\n").unwrap();
        let corpus = Corpus::load(file.path()).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.lines()[0], "第一行");
        assert_eq!(corpus.lines()[1], "第二行");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Corpus::load(&dir.path().join("nope.txt")).unwrap_err();
        assert!(err.to_string().contains("Failed to read corpus file"));
    }

    #[test]
    fn test_load_blank_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  \n\n").unwrap();
        assert!(Corpus::load(file.path()).is_err());
    }
}
