//! Include path resolution and template file loading.

use crate::error::{Result, TemplateError};
use kumo_ast::{ComponentNode, DirectiveKind};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component as PathComponent, Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};

/// Resolves `$include` targets relative to the including document.
#[derive(Debug, Clone, Default)]
pub struct IncludePathResolver {
    include_root: Option<PathBuf>,
}

impl IncludePathResolver {
    /// Create a resolver; when `include_root` is given every resolved
    /// include must stay inside it.
    pub fn new(include_root: Option<&Path>) -> Result<Self> {
        let include_root = include_root
            .map(|root| {
                root.canonicalize()
                    .map_err(|source| TemplateError::io(root, source))
            })
            .transpose()?;
        Ok(Self { include_root })
    }

    /// Resolve `template` against `current_dir` to an absolute, canonical
    /// path of an existing file.
    pub fn resolve(
        &self,
        template: &str,
        current_dir: &Path,
        included_from: &Path,
    ) -> Result<PathBuf> {
        validate_template_path(template)?;

        let candidate = current_dir.join(template);
        if !candidate.is_file() {
            return Err(TemplateError::TemplateNotFound {
                template: template.to_string(),
                resolved: candidate,
                included_from: included_from.to_path_buf(),
            });
        }

        let resolved = candidate
            .canonicalize()
            .map_err(|source| TemplateError::io(&candidate, source))?;
        self.ensure_within_root(&resolved)?;
        Ok(resolved)
    }

    fn ensure_within_root(&self, path: &Path) -> Result<()> {
        match &self.include_root {
            Some(root) if !path.starts_with(root) => Err(TemplateError::PathTraversal {
                path: path.to_path_buf(),
            }),
            _ => Ok(()),
        }
    }
}

/// Include paths are always relative to the including document.
fn validate_template_path(template: &str) -> Result<()> {
    let path = Path::new(template);
    let anchored = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, PathComponent::RootDir | PathComponent::Prefix(_)));
    if anchored {
        return Err(TemplateError::InvalidDirective {
            directive: DirectiveKind::Include,
            message: format!("template path must be relative: {template}"),
        });
    }
    Ok(())
}

/// Directory that anchors relative includes for a document at `base_path`.
///
/// `base_path` normally names the document file; an existing directory is
/// used as-is.
pub fn base_dir(base_path: &Path) -> PathBuf {
    if base_path.is_dir() {
        return base_path.to_path_buf();
    }
    match base_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Identity of a file's content: metadata plus a SHA-256 digest, so an edit
/// that keeps the length and modification time is still noticed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub modified: Option<SystemTime>,
    pub len: u64,
    pub digest: [u8; 32],
}

impl Fingerprint {
    /// Fingerprint the file at `path` as it is on disk now.
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let bytes = fs::read(path)?;
        Ok(Self::from_parts(&metadata, &bytes))
    }

    fn from_parts(metadata: &fs::Metadata, bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
            digest: hasher.finalize().into(),
        }
    }
}

/// Read and parse a template file. The fingerprint describes exactly the
/// bytes that were parsed.
pub fn load_document(path: &Path) -> Result<(Vec<ComponentNode>, Fingerprint)> {
    let metadata = fs::metadata(path).map_err(|e| read_error(path, e))?;
    let bytes = fs::read(path).map_err(|e| read_error(path, e))?;
    let fingerprint = Fingerprint::from_parts(&metadata, &bytes);
    let source = std::str::from_utf8(&bytes)
        .map_err(|e| TemplateError::io(path, std::io::Error::new(ErrorKind::InvalidData, e)))?;
    let nodes = kumo_ast::parse(source).map_err(|source| TemplateError::Parse {
        path: Some(path.to_path_buf()),
        source,
    })?;
    Ok((nodes, fingerprint))
}

fn read_error(path: &Path, error: std::io::Error) -> TemplateError {
    if error.kind() == ErrorKind::NotFound {
        TemplateError::TemplateNotFound {
            template: path.display().to_string(),
            resolved: path.to_path_buf(),
            included_from: path.to_path_buf(),
        }
    } else {
        TemplateError::io(path, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path_valid() {
        assert!(validate_template_path("header.yaml").is_ok());
        assert!(validate_template_path("./parts/header.yaml").is_ok());
        assert!(validate_template_path("../shared/footer.yaml").is_ok());
    }

    #[test]
    fn test_validate_path_rejects_absolute() {
        let result = validate_template_path("/etc/passwd");
        assert!(matches!(
            result,
            Err(TemplateError::InvalidDirective {
                directive: DirectiveKind::Include,
                ..
            })
        ));
    }

    #[test]
    fn test_resolve_relative_to_current_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("parts")).unwrap();
        fs::write(dir.path().join("parts/item.yaml"), "[]").unwrap();

        let resolver = IncludePathResolver::default();
        let resolved = resolver
            .resolve("parts/item.yaml", dir.path(), &dir.path().join("root.yaml"))
            .unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("parts/item.yaml"));
    }

    #[test]
    fn test_resolve_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = IncludePathResolver::default();
        let result = resolver.resolve("nope.yaml", dir.path(), &dir.path().join("root.yaml"));
        match result {
            Err(TemplateError::TemplateNotFound { template, .. }) => {
                assert_eq!(template, "nope.yaml")
            }
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[test]
    fn test_include_root_containment() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("templates");
        fs::create_dir(&root).unwrap();
        fs::write(dir.path().join("secret.yaml"), "[]").unwrap();
        fs::write(root.join("ok.yaml"), "[]").unwrap();

        let resolver = IncludePathResolver::new(Some(root.as_path())).unwrap();
        assert!(resolver.resolve("ok.yaml", &root, &root).is_ok());
        let result = resolver.resolve("../secret.yaml", &root, &root);
        assert!(matches!(result, Err(TemplateError::PathTraversal { .. })));
    }

    #[test]
    fn test_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(base_dir(dir.path()), dir.path().to_path_buf());
        assert_eq!(
            base_dir(&dir.path().join("page.yaml")),
            dir.path().to_path_buf()
        );
        assert_eq!(base_dir(Path::new("page.yaml")), PathBuf::from("."));
    }

    #[test]
    fn test_fingerprint_sees_same_length_edit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.yaml");
        fs::write(&path, "- type: text\n  content: old\n").unwrap();
        let (_, loaded) = load_document(&path).unwrap();
        assert_eq!(Fingerprint::of(&path).unwrap(), loaded);

        fs::write(&path, "- type: text\n  content: new\n").unwrap();
        let edited = Fingerprint::of(&path).unwrap();
        assert_eq!(edited.len, loaded.len);
        assert_ne!(edited.digest, loaded.digest);
    }

    #[test]
    fn test_load_document_rejects_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin.yaml");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(load_document(&path), Err(TemplateError::Io { .. })));
    }

    #[test]
    fn test_load_document_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        fs::write(&path, "- type: [").unwrap();
        match load_document(&path) {
            Err(TemplateError::Parse { path: Some(p), .. }) => assert_eq!(p, path),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
