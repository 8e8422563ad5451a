//! In-memory remote host for tests.
//!
//! [`MemoryRemote`] stands in for both the FTP server and the web server of
//! a shared host. It accepts connections, stores uploaded files, and, when
//! the extraction program is fetched, parses the uploaded program's plan and
//! executes it step by step against the stored archive.

use crate::artefact::extraction::{ArchiveEntry, read_entries};
use crate::bridge::directive::{
    DirectiveStep, ExtractionDirective, SUCCESS_MARKER, archive_not_deleted_message,
    missing_archive_message, unreadable_archive_message,
};
use crate::bridge::trigger::{ExtractionTrigger, TriggerError};
use crate::transport::{
    ConnectionError, Connector, EntryKind, RemoteEntry, RemoteOperation, RemoteStore,
    TransferError, remote_parent,
};
use camino::Utf8PathBuf;
use sitedrop::config::{
    DeploymentConfig, Password, RemoteEndpoint, Timeouts, TransportSecurity,
};
use sitedrop::names::{ArchiveName, RemoteDir, ScriptName, SiteUrl};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

/// A deployment configuration pointing at `ftp.example.net:/site/` and
/// `http://example.net`, archiving `out` as `app.zip`.
#[must_use]
pub fn sample_config() -> DeploymentConfig {
    DeploymentConfig {
        remote: RemoteEndpoint {
            host: "ftp.example.net".to_owned(),
            port: 21,
            user: "deploy".to_owned(),
            password: Password::new("s3cret"),
            security: TransportSecurity::Plain,
            base_path: valid(RemoteDir::try_from("/site/")),
        },
        build_dir: Utf8PathBuf::from("out"),
        archive_name: valid(ArchiveName::try_from("app.zip")),
        site_url: valid(SiteUrl::try_from("http://example.net")),
        trigger_script: valid(ScriptName::try_from("_unzip.php")),
        timeouts: Timeouts {
            connect: Duration::from_secs(5),
            transfer: Duration::from_secs(10),
            trigger: Duration::from_secs(30),
        },
        clear_before_deploy: true,
    }
}

fn valid<T, E: std::fmt::Display>(parsed: Result<T, E>) -> T {
    match parsed {
        Ok(value) => value,
        Err(e) => panic!("sample configuration must be valid: {e}"),
    }
}

/// Something observable the remote host was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    /// A session was authenticated.
    Connected,
    /// A session was refused.
    Refused,
    /// A directory was cleared.
    Cleared(String),
    /// A directory was listed.
    Listed(String),
    /// A file was stored.
    Uploaded(String),
    /// An HTTP GET arrived.
    Fetched(String),
    /// A session was closed.
    Closed,
}

/// How the web server answers the next trigger request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerBehaviour {
    /// Run the uploaded program and return its output.
    Execute,
    /// Never answer.
    Timeout,
    /// Answer with this HTTP status.
    Status(u16),
    /// Answer with this body without running anything.
    Respond(String),
}

#[derive(Debug)]
struct Host {
    user: String,
    password: String,
    site_url: String,
    served_dir: String,
    unreachable: bool,
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    rejected_uploads: BTreeSet<String>,
    locked: BTreeSet<String>,
    trigger_queue: VecDeque<TriggerBehaviour>,
    events: Vec<RemoteEvent>,
    local_sources: Vec<PathBuf>,
    open_sessions: usize,
}

/// Shared handle to an in-memory FTP and HTTP host.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    host: Rc<RefCell<Host>>,
}

impl MemoryRemote {
    /// A host that accepts `config`'s credentials and serves its base
    /// directory at its site URL.
    #[must_use]
    pub fn for_config(config: &DeploymentConfig) -> Self {
        Self {
            host: Rc::new(RefCell::new(Host {
                user: config.remote.user.clone(),
                password: config.remote.password.expose().to_owned(),
                site_url: config.site_url.as_str().to_owned(),
                served_dir: dir_key(config.remote.base_path.as_str()),
                unreachable: false,
                files: BTreeMap::new(),
                dirs: BTreeSet::new(),
                rejected_uploads: BTreeSet::new(),
                locked: BTreeSet::new(),
                trigger_queue: VecDeque::new(),
                events: Vec::new(),
                local_sources: Vec::new(),
                open_sessions: 0,
            })),
        }
    }

    /// Accept only this password from now on.
    pub fn set_password(&self, password: &str) {
        password.clone_into(&mut self.host.borrow_mut().password);
    }

    /// Refuse every connection.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.host.borrow_mut().unreachable = unreachable;
    }

    /// Reject uploads to `path`.
    pub fn reject_uploads_to(&self, path: &str) {
        self.host.borrow_mut().rejected_uploads.insert(path.to_owned());
    }

    /// Reject deletion of `path`.
    pub fn lock(&self, path: &str) {
        self.host.borrow_mut().locked.insert(path.to_owned());
    }

    /// Remove every lock.
    pub fn unlock_all(&self) {
        self.host.borrow_mut().locked.clear();
    }

    /// Queue the answer to the next trigger request. Unqueued requests run
    /// the uploaded program.
    pub fn queue_trigger(&self, behaviour: TriggerBehaviour) {
        self.host.borrow_mut().trigger_queue.push_back(behaviour);
    }

    /// Store a file directly, creating its parents.
    pub fn put_file(&self, path: &str, contents: &[u8]) {
        let mut host = self.host.borrow_mut();
        host.ensure_dir(remote_parent(path));
        host.files.insert(path.to_owned(), contents.to_vec());
    }

    /// Create a directory and its parents.
    pub fn make_dir(&self, path: &str) {
        self.host.borrow_mut().ensure_dir(path);
    }

    /// Contents of the file at `path`.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.host.borrow().files.get(path).cloned()
    }

    /// Whether a file exists at `path`.
    #[must_use]
    pub fn has_file(&self, path: &str) -> bool {
        self.host.borrow().files.contains_key(path)
    }

    /// Whether a directory exists at `path`.
    #[must_use]
    pub fn has_dir(&self, path: &str) -> bool {
        self.host.borrow().dir_exists(&dir_key(path))
    }

    /// Every stored file path, sorted.
    #[must_use]
    pub fn file_paths(&self) -> Vec<String> {
        self.host.borrow().files.keys().cloned().collect()
    }

    /// Everything that happened, in order.
    #[must_use]
    pub fn events(&self) -> Vec<RemoteEvent> {
        self.host.borrow().events.clone()
    }

    /// Remote paths uploaded, in order.
    #[must_use]
    pub fn uploads(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RemoteEvent::Uploaded(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    /// Local files read by uploads, in order.
    #[must_use]
    pub fn local_sources(&self) -> Vec<PathBuf> {
        self.host.borrow().local_sources.clone()
    }

    /// Number of HTTP requests received.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, RemoteEvent::Fetched(_)))
            .count()
    }

    /// Sessions currently open.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.host.borrow().open_sessions
    }

    fn record(&self, event: RemoteEvent) {
        self.host.borrow_mut().events.push(event);
    }
}

impl Connector for MemoryRemote {
    fn open(
        &self,
        endpoint: &RemoteEndpoint,
        _timeouts: &Timeouts,
    ) -> Result<Box<dyn RemoteStore>, ConnectionError> {
        let mut host = self.host.borrow_mut();
        if host.unreachable {
            host.events.push(RemoteEvent::Refused);
            return Err(ConnectionError::Unreachable {
                address: endpoint.address(),
                reason: "connection refused".to_owned(),
            });
        }
        if endpoint.user != host.user || endpoint.password.expose() != host.password {
            host.events.push(RemoteEvent::Refused);
            return Err(ConnectionError::Authentication {
                user: endpoint.user.clone(),
                reason: "530 Login incorrect.".to_owned(),
            });
        }
        host.open_sessions += 1;
        host.events.push(RemoteEvent::Connected);
        Ok(Box::new(MemorySession {
            remote: self.clone(),
            open: true,
        }))
    }
}

impl ExtractionTrigger for MemoryRemote {
    fn fire(&self, url: &str, timeout: Duration) -> Result<String, TriggerError> {
        self.record(RemoteEvent::Fetched(url.to_owned()));
        let behaviour = self
            .host
            .borrow_mut()
            .trigger_queue
            .pop_front()
            .unwrap_or(TriggerBehaviour::Execute);
        match behaviour {
            TriggerBehaviour::Timeout => Err(TriggerError::Timeout {
                url: url.to_owned(),
                seconds: timeout.as_secs(),
            }),
            TriggerBehaviour::Status(status) => Err(TriggerError::Status {
                url: url.to_owned(),
                status,
            }),
            TriggerBehaviour::Respond(body) => Ok(body),
            TriggerBehaviour::Execute => self.execute(url),
        }
    }
}

impl MemoryRemote {
    fn execute(&self, url: &str) -> Result<String, TriggerError> {
        let mut host = self.host.borrow_mut();
        let not_found = || TriggerError::Status {
            url: url.to_owned(),
            status: 404,
        };
        let name = url
            .strip_prefix(host.site_url.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(not_found)?;
        let script_path = format!("{}/{name}", host.served_dir);
        let source = host.files.get(&script_path).cloned().ok_or_else(not_found)?;
        let directive = ExtractionDirective::from_source(&String::from_utf8_lossy(&source))
            .map_err(|_| TriggerError::Status {
                url: url.to_owned(),
                status: 500,
            })?;
        Ok(host.run_directive(&directive, &script_path))
    }
}

impl Host {
    fn dir_exists(&self, key: &str) -> bool {
        key.is_empty() || self.dirs.contains(key)
    }

    fn ensure_dir(&mut self, path: &str) {
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            self.dirs.insert(current.clone());
        }
    }

    fn children(&self, key: &str) -> Vec<RemoteEntry> {
        let prefix = format!("{key}/");
        let direct = |path: &String| {
            path.strip_prefix(prefix.as_str())
                .filter(|rest| !rest.is_empty() && !rest.contains('/'))
                .map(str::to_owned)
        };
        let mut entries: Vec<RemoteEntry> = self
            .dirs
            .iter()
            .filter_map(direct)
            .map(RemoteEntry::directory)
            .collect();
        entries.extend(self.files.keys().filter_map(direct).map(RemoteEntry::file));
        entries
    }

    /// Execute a directive's steps the way the rendered program would.
    fn run_directive(&mut self, directive: &ExtractionDirective, script_path: &str) -> String {
        let archive = directive.archive().as_str();
        let archive_path = format!("{}/{archive}", self.served_dir);
        let mut output = String::new();
        let mut entries: Vec<ArchiveEntry> = Vec::new();

        for step in directive.steps() {
            match step {
                DirectiveStep::RequireArchive => {
                    if !self.files.contains_key(&archive_path) {
                        return missing_archive_message(archive);
                    }
                }
                DirectiveStep::OpenArchive => {
                    let decoded = self
                        .files
                        .get(&archive_path)
                        .and_then(|bytes| read_entries(Cursor::new(bytes.clone())).ok());
                    match decoded {
                        Some(decoded) => entries = decoded,
                        None => {
                            self.files.remove(script_path);
                            return unreadable_archive_message(archive);
                        }
                    }
                }
                DirectiveStep::ExtractHere => {
                    for entry in entries.drain(..) {
                        let target = format!("{}/{}", self.served_dir, entry.path());
                        match entry {
                            ArchiveEntry::Directory(_) => self.ensure_dir(&target),
                            ArchiveEntry::File { contents, .. } => {
                                self.ensure_dir(remote_parent(&target));
                                self.files.insert(target, contents);
                            }
                        }
                    }
                }
                DirectiveStep::DeleteArchive => {
                    if self.locked.contains(&archive_path) {
                        self.files.remove(script_path);
                        return archive_not_deleted_message(archive);
                    }
                    self.files.remove(&archive_path);
                }
                DirectiveStep::EmitMarker => output.push_str(SUCCESS_MARKER),
                DirectiveStep::DeleteSelf => {
                    self.files.remove(script_path);
                }
            }
        }
        output
    }
}

/// One session against a [`MemoryRemote`].
#[derive(Debug)]
pub struct MemorySession {
    remote: MemoryRemote,
    open: bool,
}

impl MemorySession {
    fn check_open(&self) -> Result<(), TransferError> {
        if self.open {
            Ok(())
        } else {
            Err(TransferError::Closed)
        }
    }
}

impl RemoteStore for MemorySession {
    fn clear_directory(&mut self, path: &str) -> Result<(), TransferError> {
        self.check_open()?;
        self.remote.record(RemoteEvent::Cleared(path.to_owned()));
        let mut host = self.remote.host.borrow_mut();
        host.ensure_dir(path);

        let key = dir_key(path);
        let prefix = format!("{key}/");
        let files: Vec<String> = host
            .files
            .keys()
            .filter(|p| p.starts_with(&prefix))
            .cloned()
            .collect();
        for file in files {
            if host.locked.contains(&file) {
                return Err(TransferError::Rejected {
                    operation: RemoteOperation::Delete,
                    path: file,
                    reason: "550 Permission denied".to_owned(),
                });
            }
            host.files.remove(&file);
        }
        let dirs: Vec<String> = host
            .dirs
            .iter()
            .filter(|d| d.starts_with(&prefix))
            .cloned()
            .collect();
        for dir in dirs.iter().rev() {
            host.dirs.remove(dir);
        }
        Ok(())
    }

    fn upload_file(&mut self, local_path: &Path, remote_path: &str) -> Result<u64, TransferError> {
        self.check_open()?;
        let contents = fs::read(local_path).map_err(|source| TransferError::LocalRead {
            path: local_path.to_path_buf(),
            source,
        })?;
        let mut host = self.remote.host.borrow_mut();
        host.local_sources.push(local_path.to_path_buf());
        if host.rejected_uploads.contains(remote_path) {
            return Err(TransferError::Rejected {
                operation: RemoteOperation::Upload,
                path: remote_path.to_owned(),
                reason: "452 Insufficient storage space".to_owned(),
            });
        }
        host.ensure_dir(remote_parent(remote_path));
        let bytes = contents.len() as u64;
        host.files.insert(remote_path.to_owned(), contents);
        host.events.push(RemoteEvent::Uploaded(remote_path.to_owned()));
        Ok(bytes)
    }

    fn list_directory(&mut self, path: &str) -> Result<Option<Vec<RemoteEntry>>, TransferError> {
        self.check_open()?;
        self.remote.record(RemoteEvent::Listed(path.to_owned()));
        let host = self.remote.host.borrow();
        let key = dir_key(path);
        if !host.dir_exists(&key) {
            return Ok(None);
        }
        Ok(Some(host.children(&key)))
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            let mut host = self.remote.host.borrow_mut();
            host.open_sessions = host.open_sessions.saturating_sub(1);
            host.events.push(RemoteEvent::Closed);
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Directory key without trailing `/`; the root is the empty string.
fn dir_key(path: &str) -> String {
    path.trim_end_matches('/').to_owned()
}

/// Whether an entry list contains a file called `name`.
#[must_use]
pub fn lists_file(entries: &[RemoteEntry], name: &str) -> bool {
    entries
        .iter()
        .any(|e| e.kind == EntryKind::File && e.name == name)
}
