use crate::source::BlobSource;
use crate::source::SourceError;
use glob::glob;
use glob::Pattern;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;
use url::Url;

/// Files under `root`, inside the `container` directory.
///
/// Locators are plain names relative to the container, or `file://` URLs
/// pointing inside the root.
#[derive(Clone, Debug)]
pub struct FileSystemSource {
    root: PathBuf,
    container: String,
}

impl FileSystemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            container: "/".to_owned(),
        }
    }

    pub fn with_container(mut self, container: &str) -> Self {
        self.container = container.to_owned();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_path(&self) -> PathBuf {
        self.root.join(self.container.trim_start_matches('/'))
    }

    /// Maps a locator to a path below the root.
    fn resolve(&self, locator: &str) -> Result<PathBuf, SourceError> {
        if let Ok(url) = Url::parse(locator) {
            if url.scheme().len() > 1 {
                if url.scheme() != "file" {
                    Err(SourceError::UnsupportedScheme {
                        scheme: url.scheme().to_owned(),
                        locator: locator.to_owned(),
                    })?
                }
                let path = url
                    .to_file_path()
                    .map_err(|_| SourceError::NotFound(locator.to_owned()))?;
                let escapes = path.components().any(|component| component == Component::ParentDir);
                if escapes || !path.starts_with(&self.root) {
                    Err(SourceError::NotFound(locator.to_owned()))?
                }
                return Ok(path);
            }
        }

        let relative = Path::new(locator);
        let plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if locator.is_empty() || !plain {
            Err(SourceError::NotFound(locator.to_owned()))?
        }
        Ok(self.container_path().join(relative))
    }
}

impl BlobSource for FileSystemSource {
    fn fetch_bytes(&self, locator: &str) -> Result<Vec<u8>, SourceError> {
        let path = self.resolve(locator)?;
        if !path.is_file() {
            Err(SourceError::NotFound(locator.to_owned()))?
        }
        debug!(locator, path = %path.display(), "reading spreadsheet");
        std::fs::read(&path).map_err(|error| match error.kind() {
            std::io::ErrorKind::NotFound => SourceError::NotFound(locator.to_owned()),
            _ => SourceError::Io {
                locator: locator.to_owned(),
                source: error,
            },
        })
    }

    fn list(&self) -> Result<Vec<String>, SourceError> {
        let directory = Pattern::escape(&self.container_path().to_string_lossy());
        let mut names = Vec::new();
        for entry in glob(&format!("{}/*", directory.trim_end_matches('/')))? {
            let path = entry?;
            if !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                names.push(name.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn source() -> (tempfile::TempDir, FileSystemSource) {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("data")).unwrap();
        fs::write(root.path().join("data/b.csv"), "b").unwrap();
        fs::write(root.path().join("data/a.csv"), "a").unwrap();
        fs::create_dir(root.path().join("data/nested")).unwrap();
        fs::write(root.path().join("secret.txt"), "s").unwrap();
        let source = FileSystemSource::new(root.path()).with_container("/data");
        (root, source)
    }

    #[test]
    fn fetch_relative_names() {
        let (_root, source) = source();
        assert_eq!(source.fetch_bytes("a.csv").unwrap(), b"a");
        assert_eq!(source.fetch_bytes("./b.csv").unwrap(), b"b");
        assert!(matches!(source.fetch_bytes("missing.csv"), Err(SourceError::NotFound(_))));
        assert!(matches!(source.fetch_bytes("nested"), Err(SourceError::NotFound(_))));
    }

    #[test]
    fn reject_escaping_paths() {
        let (_root, source) = source();
        assert!(matches!(source.fetch_bytes("../secret.txt"), Err(SourceError::NotFound(_))));
        assert!(matches!(source.fetch_bytes("/etc/passwd"), Err(SourceError::NotFound(_))));
        assert!(matches!(source.fetch_bytes(""), Err(SourceError::NotFound(_))));
    }

    #[test]
    fn fetch_file_urls() {
        let (root, source) = source();
        let url = Url::from_file_path(root.path().join("data/a.csv")).unwrap();
        assert_eq!(source.fetch_bytes(url.as_str()).unwrap(), b"a");
        let outside = Url::from_file_path(std::env::temp_dir().join("elsewhere.csv")).unwrap();
        assert!(matches!(source.fetch_bytes(outside.as_str()), Err(SourceError::NotFound(_))));
        assert!(matches!(
            source.fetch_bytes("https://example.com/a.csv"),
            Err(SourceError::UnsupportedScheme { scheme, .. }) if scheme == "https"
        ));
    }

    #[test]
    fn list_container_files() {
        let (_root, source) = source();
        assert_eq!(source.list().unwrap(), vec!["a.csv", "b.csv"]);
    }
}
