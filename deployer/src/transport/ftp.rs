//! FTP and explicit-TLS FTP (FTPS) implementation of the remote store.

use super::{
    Connector, ConnectionError, EntryKind, RemoteEntry, RemoteOperation, RemoteStore,
    TransferError, remote_parent,
};
use sitedrop::config::{RemoteEndpoint, Timeouts, TransportSecurity};
use std::fs;
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use suppaftp::list::File as ListedFile;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpResult, NativeTlsConnector, NativeTlsFtpStream, Status};

/// Opens [`FtpSession`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct FtpConnector;

impl Connector for FtpConnector {
    fn open(
        &self,
        endpoint: &RemoteEndpoint,
        timeouts: &Timeouts,
    ) -> Result<Box<dyn RemoteStore>, ConnectionError> {
        FtpSession::connect(endpoint, timeouts).map(|s| Box::new(s) as Box<dyn RemoteStore>)
    }
}

/// An authenticated FTP control connection.
pub struct FtpSession {
    stream: Option<NativeTlsFtpStream>,
}

impl FtpSession {
    /// Dial, optionally upgrade to TLS, log in, and switch to binary mode.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] describing the first step that failed.
    pub fn connect(endpoint: &RemoteEndpoint, timeouts: &Timeouts) -> Result<Self, ConnectionError> {
        let address = endpoint.address();
        let socket = resolve(&address)?;
        log::debug!("connecting to {address} ({socket})");

        let stream = NativeTlsFtpStream::connect_timeout(socket, timeouts.connect)
            .map_err(|e| connect_failure(&address, timeouts.connect, e))?;
        set_io_timeouts(stream.get_ref(), timeouts.transfer).map_err(|e| {
            ConnectionError::Unreachable {
                address: address.clone(),
                reason: e.to_string(),
            }
        })?;
        let (connect, transfer) = (timeouts.connect, timeouts.transfer);
        let mut stream = stream.passive_stream_builder(move |data: SocketAddr| {
            open_data_channel(data, connect, transfer)
        });

        if endpoint.security == TransportSecurity::ExplicitTls {
            let tls = suppaftp::native_tls::TlsConnector::new().map_err(|e| {
                ConnectionError::Security {
                    host: endpoint.host.clone(),
                    reason: e.to_string(),
                }
            })?;
            stream = stream
                .into_secure(NativeTlsConnector::from(tls), &endpoint.host)
                .map_err(|e| ConnectionError::Security {
                    host: endpoint.host.clone(),
                    reason: e.to_string(),
                })?;
            log::debug!("control channel upgraded to TLS");
        }

        stream
            .login(endpoint.user.as_str(), endpoint.password.expose())
            .map_err(|e| match e {
                FtpError::UnexpectedResponse(_) => ConnectionError::Authentication {
                    user: endpoint.user.clone(),
                    reason: e.to_string(),
                },
                other => connect_failure(&address, timeouts.connect, other),
            })?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| connect_failure(&address, timeouts.connect, e))?;

        log::info!("connected to {address} as {}", endpoint.user);
        Ok(Self {
            stream: Some(stream),
        })
    }

    fn stream(&mut self) -> Result<&mut NativeTlsFtpStream, TransferError> {
        self.stream.as_mut().ok_or(TransferError::Closed)
    }

    /// Create `path` and any missing ancestors.
    fn ensure_dir(&mut self, path: &str) -> Result<(), TransferError> {
        let stream = self.stream()?;
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            if stream.cwd(current.as_str()).is_ok() {
                continue;
            }
            log::debug!("MKD {current}");
            stream
                .mkdir(current.as_str())
                .map_err(|e| rejected(RemoteOperation::MakeDir, &current, e))?;
        }
        Ok(())
    }

    /// Delete every child of `dir` recursively, leaving `dir` itself.
    fn remove_children(&mut self, dir: &str) -> Result<(), TransferError> {
        let Some(entries) = self.list_directory(dir)? else {
            return Err(TransferError::Rejected {
                operation: RemoteOperation::List,
                path: dir.to_owned(),
                reason: "directory disappeared while clearing".to_owned(),
            });
        };
        for entry in entries {
            let path = format!("{}/{}", dir.trim_end_matches('/'), entry.name);
            match entry.kind {
                EntryKind::Directory => {
                    self.remove_children(&path)?;
                    log::debug!("RMD {path}");
                    self.stream()?
                        .rmdir(path.as_str())
                        .map_err(|e| rejected(RemoteOperation::RemoveDir, &path, e))?;
                }
                EntryKind::File | EntryKind::Other => {
                    log::debug!("DELE {path}");
                    self.stream()?
                        .rm(path.as_str())
                        .map_err(|e| rejected(RemoteOperation::Delete, &path, e))?;
                }
            }
        }
        Ok(())
    }

    fn raw_listing(&mut self, path: &str) -> Result<Vec<RemoteEntry>, TransferError> {
        let stream = self.stream()?;
        let entries = match stream.mlsd(Some(path)) {
            Ok(lines) => parse_lines(&lines, ListedFile::from_mlsx_line),
            Err(FtpError::UnexpectedResponse(response)) => {
                log::debug!("MLSD unsupported ({}); falling back to LIST", response.status.code());
                let lines = stream
                    .list(Some(path))
                    .map_err(|e| rejected(RemoteOperation::List, path, e))?;
                parse_lines(&lines, |line| ListedFile::try_from(line))
            }
            Err(e) => return Err(rejected(RemoteOperation::List, path, e)),
        };
        Ok(entries)
    }
}

impl RemoteStore for FtpSession {
    fn clear_directory(&mut self, path: &str) -> Result<(), TransferError> {
        self.ensure_dir(path)?;
        self.remove_children(path)?;
        log::info!("cleared remote directory {path}");
        Ok(())
    }

    fn upload_file(&mut self, local_path: &Path, remote_path: &str) -> Result<u64, TransferError> {
        let local_read = |source| TransferError::LocalRead {
            path: local_path.to_path_buf(),
            source,
        };
        let expected = fs::metadata(local_path).map_err(local_read)?.len();
        let mut reader = fs::File::open(local_path).map_err(local_read)?;

        self.ensure_dir(remote_parent(remote_path))?;
        log::debug!("STOR {remote_path} ({expected} bytes)");
        let stream = self.stream()?;
        let sent = stream
            .put_file(remote_path, &mut reader)
            .map_err(|e| rejected(RemoteOperation::Upload, remote_path, e))?;

        let stored = match stream.size(remote_path) {
            Ok(size) => u64::try_from(size).unwrap_or(u64::MAX),
            Err(e) => {
                log::debug!("SIZE {remote_path} unavailable ({e}); trusting sent byte count");
                sent
            }
        };
        if stored != expected {
            return Err(TransferError::Incomplete {
                path: remote_path.to_owned(),
                stored,
                expected,
            });
        }
        log::info!("uploaded {} to {remote_path}", local_path.display());
        Ok(stored)
    }

    fn list_directory(&mut self, path: &str) -> Result<Option<Vec<RemoteEntry>>, TransferError> {
        match self.stream()?.cwd(path) {
            Ok(()) => self.raw_listing(path).map(Some),
            Err(FtpError::UnexpectedResponse(response))
                if response.status == Status::FileUnavailable =>
            {
                Ok(None)
            }
            Err(e) => Err(rejected(RemoteOperation::List, path, e)),
        }
    }

    fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.quit() {
                log::debug!("QUIT failed: {e}");
            }
            log::debug!("FTP session closed");
        }
    }
}

impl Drop for FtpSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn resolve(address: &str) -> Result<SocketAddr, ConnectionError> {
    let unreachable = |reason: String| ConnectionError::Unreachable {
        address: address.to_owned(),
        reason,
    };
    address
        .to_socket_addrs()
        .map_err(|e| unreachable(e.to_string()))?
        .next()
        .ok_or_else(|| unreachable("host name did not resolve".to_owned()))
}

fn set_io_timeouts(socket: &TcpStream, timeout: Duration) -> io::Result<()> {
    socket.set_read_timeout(Some(timeout))?;
    socket.set_write_timeout(Some(timeout))
}

/// Dial a passive-mode data connection bounded by the session timeouts.
fn open_data_channel(
    address: SocketAddr,
    connect: Duration,
    transfer: Duration,
) -> FtpResult<TcpStream> {
    let socket =
        TcpStream::connect_timeout(&address, connect).map_err(FtpError::ConnectionError)?;
    set_io_timeouts(&socket, transfer).map_err(FtpError::ConnectionError)?;
    Ok(socket)
}

fn connect_failure(address: &str, timeout: Duration, error: FtpError) -> ConnectionError {
    if let FtpError::ConnectionError(io_err) = &error
        && is_timeout(io_err)
    {
        return ConnectionError::Timeout {
            address: address.to_owned(),
            seconds: timeout.as_secs(),
        };
    }
    ConnectionError::Unreachable {
        address: address.to_owned(),
        reason: error.to_string(),
    }
}

fn rejected(operation: RemoteOperation, path: &str, error: FtpError) -> TransferError {
    if let FtpError::ConnectionError(io_err) = &error
        && is_timeout(io_err)
    {
        return TransferError::Timeout {
            operation,
            path: path.to_owned(),
        };
    }
    TransferError::Rejected {
        operation,
        path: path.to_owned(),
        reason: error.to_string().trim().to_owned(),
    }
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

fn parse_lines<E, F>(lines: &[String], parse: F) -> Vec<RemoteEntry>
where
    E: std::fmt::Display,
    F: Fn(&str) -> Result<ListedFile, E>,
{
    lines
        .iter()
        .filter_map(|line| match parse(line) {
            Ok(file) => Some(file),
            Err(e) => {
                log::debug!("skipping unparseable listing line {line:?}: {e}");
                None
            }
        })
        .filter(|file| !matches!(file.name(), "." | ".."))
        .map(|file| RemoteEntry {
            name: file.name().to_owned(),
            kind: entry_kind(&file),
        })
        .collect()
}

fn entry_kind(file: &ListedFile) -> EntryKind {
    if file.is_directory() {
        EntryKind::Directory
    } else if file.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    }
}

#[cfg(test)]
#[path = "ftp_tests.rs"]
mod tests;
