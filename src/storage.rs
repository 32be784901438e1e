//! Writing rendered artifacts next to an output prefix, locally or remotely.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{DiagramError, Result};

/// One output file, written as `<prefix>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub ext: &'static str,
    pub contents: Vec<u8>,
}

impl Artifact {
    pub fn new(ext: &'static str, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            ext,
            contents: contents.into(),
        }
    }
}

/// Remote storage that accepts whole files under `scheme://bucket/key` locations.
pub trait ObjectStore: fmt::Debug + Send + Sync {
    /// Make sure objects can be created under the parent of `uri`.
    fn ensure_prefix(&self, uri: &str) -> io::Result<()>;
    fn upload(&self, local: &Path, uri: &str) -> io::Result<()>;
}

/// Object store backed by a local directory, e.g. a mounted bucket.
///
/// `gs://bucket/a/b` maps to `<root>/bucket/a/b`.
#[derive(Debug, Clone)]
pub struct MirrorStore {
    root: PathBuf,
}

impl MirrorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn local_path(&self, uri: &str) -> io::Result<PathBuf> {
        let (_, rest) = split_uri(uri)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("not a remote uri: {uri}")))?;
        let mut path = self.root.clone();
        for part in rest.split('/').filter(|part| !part.is_empty()) {
            if part == ".." || part == "." {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("relative segment in {uri}"),
                ));
            }
            path.push(part);
        }
        Ok(path)
    }
}

impl ObjectStore for MirrorStore {
    fn ensure_prefix(&self, uri: &str) -> io::Result<()> {
        let path = self.local_path(uri)?;
        match path.parent() {
            Some(parent) => fs::create_dir_all(parent),
            None => Ok(()),
        }
    }

    fn upload(&self, local: &Path, uri: &str) -> io::Result<()> {
        fs::copy(local, self.local_path(uri)?).map(|_| ())
    }
}

/// Where artifacts go: a local path prefix or a remote uri prefix.
#[derive(Debug, Clone)]
pub enum Destination {
    Local(PathBuf),
    Remote { uri: String, store: Arc<dyn ObjectStore> },
}

impl Destination {
    /// Interpret `location`; anything containing `://` is remote and needs a store.
    pub fn parse(location: &str, store: Option<Arc<dyn ObjectStore>>) -> Result<Self> {
        if split_uri(location).is_none() {
            return Ok(Self::Local(PathBuf::from(location)));
        }
        let store = store.ok_or_else(|| {
            DiagramError::Config(format!("no object store configured for `{location}`"))
        })?;
        Ok(Self::Remote {
            uri: location.to_string(),
            store,
        })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Child location, e.g. the `diagram` prefix inside an output directory.
    pub fn join(&self, name: &str) -> Self {
        match self {
            Self::Local(path) => Self::Local(path.join(name)),
            Self::Remote { uri, store } => Self::Remote {
                uri: format!("{}/{name}", uri.trim_end_matches('/')),
                store: Arc::clone(store),
            },
        }
    }

    /// Write every artifact as `<self>.<ext>` and return the written targets in order.
    ///
    /// Remote artifacts are staged in a temporary directory that is removed
    /// before this returns.
    pub fn persist(&self, artifacts: &[Artifact]) -> Result<Vec<String>> {
        match self {
            Self::Local(prefix) => persist_local(prefix, artifacts),
            Self::Remote { uri, store } => persist_remote(uri, store.as_ref(), artifacts),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote { uri, .. } => f.write_str(uri),
        }
    }
}

fn persist_local(prefix: &Path, artifacts: &[Artifact]) -> Result<Vec<String>> {
    if let Some(parent) = prefix.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|err| DiagramError::persistence(parent.display().to_string(), err))?;
    }
    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let target = with_ext(prefix, artifact.ext);
        fs::write(&target, &artifact.contents)
            .map_err(|err| DiagramError::persistence(target.display().to_string(), err))?;
        debug!(target = %target.display(), bytes = artifact.contents.len(), "wrote artifact");
        written.push(target.display().to_string());
    }
    Ok(written)
}

fn persist_remote(uri: &str, store: &dyn ObjectStore, artifacts: &[Artifact]) -> Result<Vec<String>> {
    store
        .ensure_prefix(uri)
        .map_err(|err| DiagramError::persistence(uri, err))?;

    let staging = tempfile::Builder::new()
        .prefix("pipediag-")
        .tempdir()
        .map_err(|err| DiagramError::persistence("temporary staging directory", err))?;
    let name = uri
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("diagram");
    let staged_prefix = staging.path().join(name);

    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let staged = with_ext(&staged_prefix, artifact.ext);
        fs::write(&staged, &artifact.contents)
            .map_err(|err| DiagramError::persistence(staged.display().to_string(), err))?;
        let target = format!("{uri}.{}", artifact.ext);
        store
            .upload(&staged, &target)
            .map_err(|err| DiagramError::persistence(target.clone(), err))?;
        debug!(target = %target, bytes = artifact.contents.len(), "uploaded artifact");
        written.push(target);
    }

    staging
        .close()
        .map_err(|err| DiagramError::persistence("temporary staging directory", err))?;
    Ok(written)
}

fn with_ext(prefix: &Path, ext: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

fn split_uri(location: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = location.split_once("://")?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') {
        return None;
    }
    Some((scheme, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_prefix_keeps_dots_in_name() {
        assert_eq!(with_ext(Path::new("out/diagram"), "svg"), PathBuf::from("out/diagram.svg"));
        assert_eq!(with_ext(Path::new("out/v1.2"), "dot"), PathBuf::from("out/v1.2.dot"));
    }

    #[test]
    fn local_persist_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = Destination::Local(dir.path().join("nested/out")).join("diagram");
        let written = prefix
            .persist(&[Artifact::new("dot", "digraph {}"), Artifact::new("svg", "<svg/>")])
            .unwrap();
        assert_eq!(written.len(), 2);
        assert!(written[0].ends_with("diagram.dot"));
        let svg = fs::read_to_string(dir.path().join("nested/out/diagram.svg")).unwrap();
        assert_eq!(svg, "<svg/>");
    }

    #[test]
    fn remote_needs_store() {
        assert!(!Destination::parse("./out", None).unwrap().is_remote());
        let err = Destination::parse("gs://bucket/out", None).unwrap_err();
        assert!(matches!(err, DiagramError::Config(_)));
    }

    #[test]
    fn remote_persist_uploads_through_store() {
        let root = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(MirrorStore::new(root.path()));
        let dest = Destination::parse("s3://bucket/run1/", Some(store)).unwrap().join("diagram");
        assert_eq!(dest.to_string(), "s3://bucket/run1/diagram");

        let written = dest.persist(&[Artifact::new("svg", "<svg/>")]).unwrap();
        assert_eq!(written, vec!["s3://bucket/run1/diagram.svg".to_string()]);
        let uploaded = fs::read_to_string(root.path().join("bucket/run1/diagram.svg")).unwrap();
        assert_eq!(uploaded, "<svg/>");
    }

    #[test]
    fn mirror_store_rejects_escaping_keys() {
        let store = MirrorStore::new("/tmp/root");
        assert!(store.local_path("gs://bucket/../etc").is_err());
        assert!(store.local_path("plain/path").is_err());
        assert_eq!(
            store.local_path("gs://bucket/a//b").unwrap(),
            PathBuf::from("/tmp/root/bucket/a/b")
        );
    }

    /// Copies uploads into a mirror and remembers which staged files it was handed.
    #[derive(Debug)]
    struct Recording {
        mirror: MirrorStore,
        fail: bool,
        staged: std::sync::Mutex<Vec<PathBuf>>,
    }

    impl Recording {
        fn new(root: &Path, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                mirror: MirrorStore::new(root),
                fail,
                staged: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn staged(&self) -> Vec<PathBuf> {
            self.staged.lock().unwrap().clone()
        }
    }

    impl ObjectStore for Recording {
        fn ensure_prefix(&self, uri: &str) -> io::Result<()> {
            self.mirror.ensure_prefix(uri)
        }

        fn upload(&self, local: &Path, uri: &str) -> io::Result<()> {
            assert!(local.exists());
            self.staged.lock().unwrap().push(local.to_path_buf());
            if self.fail {
                return Err(io::Error::other("upload rejected"));
            }
            self.mirror.upload(local, uri)
        }
    }

    #[test]
    fn staging_directory_is_removed_after_upload() {
        let root = tempfile::tempdir().unwrap();
        let store = Recording::new(root.path(), false);
        let dest = Destination::Remote {
            uri: "gs://bucket/run/diagram".to_string(),
            store: store.clone(),
        };
        dest.persist(&[Artifact::new("dot", "digraph {}"), Artifact::new("svg", "<svg/>")])
            .unwrap();

        let staged = store.staged();
        assert_eq!(staged.len(), 2);
        for local in &staged {
            assert!(!local.parent().unwrap().exists(), "{} left behind", local.display());
        }
        assert!(root.path().join("bucket/run/diagram.svg").exists());
    }

    #[test]
    fn staging_directory_is_removed_when_upload_fails() {
        let root = tempfile::tempdir().unwrap();
        let store = Recording::new(root.path(), true);
        let dest = Destination::Remote {
            uri: "gs://bucket/run/diagram".to_string(),
            store: store.clone(),
        };
        let err = dest
            .persist(&[Artifact::new("dot", "digraph {}"), Artifact::new("svg", "<svg/>")])
            .unwrap_err();
        assert!(matches!(err, DiagramError::Persistence { .. }));

        let staged = store.staged();
        assert_eq!(staged.len(), 1);
        assert!(!staged[0].parent().unwrap().exists());
    }

    #[test]
    fn upload_failure_is_persistence_error() {
        #[derive(Debug)]
        struct Broken;
        impl ObjectStore for Broken {
            fn ensure_prefix(&self, _uri: &str) -> io::Result<()> {
                Ok(())
            }
            fn upload(&self, _local: &Path, _uri: &str) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
            }
        }
        let dest = Destination::Remote {
            uri: "gs://bucket/diagram".to_string(),
            store: Arc::new(Broken),
        };
        let err = dest.persist(&[Artifact::new("svg", "<svg/>")]).unwrap_err();
        match err {
            DiagramError::Persistence { target, source } => {
                assert_eq!(target, "gs://bucket/diagram.svg");
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
