use std::fs::File;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;

use ssh2::{ErrorCode, RenameFlags, Session, Sftp};
use tracing::debug;

use super::{RemoteEntry, RemoteSession, RemoteTarget, TransferError};
use crate::config::Endpoint;
use crate::types::TargetKind;

// libssh2 session error codes
const LIBSSH2_ERROR_SOCKET_SEND: i32 = -7;
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_ERROR_SOCKET_DISCONNECT: i32 = -13;
const LIBSSH2_ERROR_AUTHENTICATION_FAILED: i32 = -18;
const LIBSSH2_ERROR_PUBLICKEY_UNVERIFIED: i32 = -19;
const LIBSSH2_ERROR_SOCKET_RECV: i32 = -43;

fn map_ssh(context: &str, e: ssh2::Error) -> TransferError {
    let message = format!("{}: {}", context, e);
    match e.code() {
        ErrorCode::Session(LIBSSH2_ERROR_AUTHENTICATION_FAILED)
        | ErrorCode::Session(LIBSSH2_ERROR_PUBLICKEY_UNVERIFIED) => {
            TransferError::AuthFailed(message)
        }
        ErrorCode::SFTP(_) => TransferError::RemoteRejected(message),
        ErrorCode::Session(_) => TransferError::ConnectionFailed(message),
    }
}

/// Connects TCP with the endpoint timeout on connect, read and write.
pub(crate) fn connect_tcp(endpoint: &Endpoint) -> Result<TcpStream, TransferError> {
    let connection_failed =
        |e: std::io::Error| TransferError::ConnectionFailed(format!("{}: {}", endpoint, e));
    let addr = (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()
        .map_err(connection_failed)?
        .next()
        .ok_or_else(|| {
            TransferError::ConnectionFailed(format!("{}: no address resolved", endpoint))
        })?;
    let tcp = TcpStream::connect_timeout(&addr, endpoint.timeout).map_err(connection_failed)?;
    tcp.set_read_timeout(Some(endpoint.timeout))
        .map_err(connection_failed)?;
    tcp.set_write_timeout(Some(endpoint.timeout))
        .map_err(connection_failed)?;
    Ok(tcp)
}

/// SFTP server reached with password authentication.
#[derive(Debug, Clone)]
pub struct SftpTarget {
    endpoint: Endpoint,
}

impl SftpTarget {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

impl RemoteTarget for SftpTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Sftp
    }

    fn connect(&self) -> Result<Box<dyn RemoteSession>, TransferError> {
        let tcp = connect_tcp(&self.endpoint)?;
        let mut session = Session::new().map_err(|e| map_ssh("session", e))?;
        session.set_timeout(self.endpoint.timeout.as_millis().min(u32::MAX as u128) as u32);
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| map_ssh("handshake", e))?;
        session
            .userauth_password(&self.endpoint.username, &self.endpoint.password)
            .map_err(|e| match e.code() {
                ErrorCode::Session(
                    LIBSSH2_ERROR_SOCKET_SEND
                    | LIBSSH2_ERROR_TIMEOUT
                    | LIBSSH2_ERROR_SOCKET_DISCONNECT
                    | LIBSSH2_ERROR_SOCKET_RECV,
                ) => map_ssh("login", e),
                _ => TransferError::AuthFailed(format!("login: {}", e)),
            })?;
        if !session.authenticated() {
            return Err(TransferError::AuthFailed(format!(
                "{} rejected user {}",
                self.endpoint, self.endpoint.username
            )));
        }
        let sftp = session.sftp().map_err(|e| map_ssh("sftp subsystem", e))?;
        debug!("SFTP connected to {}", self.endpoint);
        Ok(Box::new(SftpSession { session, sftp }))
    }
}

struct SftpSession {
    session: Session,
    sftp: Sftp,
}

impl RemoteSession for SftpSession {
    fn ensure_dir(&mut self, path: &str) -> Result<(), TransferError> {
        let mut current = String::new();
        for segment in path.split('/') {
            if segment.is_empty() {
                if current.is_empty() {
                    current.push('/');
                }
                continue;
            }
            if !current.is_empty() && !current.ends_with('/') {
                current.push('/');
            }
            current.push_str(segment);
            let dir = Path::new(&current);
            if self.sftp.stat(dir).is_ok() {
                continue;
            }
            if let Err(e) = self.sftp.mkdir(dir, 0o755) {
                // Lost a race with another uploader
                if self.sftp.stat(dir).is_err() {
                    return Err(map_ssh(&format!("mkdir {}", current), e));
                }
            }
        }
        Ok(())
    }

    fn put(&mut self, local: &Path, remote: &str) -> Result<(), TransferError> {
        let mut source = File::open(local).map_err(|e| {
            TransferError::RemoteRejected(format!("cannot read {:?}: {}", local, e))
        })?;
        let mut dest = self
            .sftp
            .create(Path::new(remote))
            .map_err(|e| map_ssh(&format!("create {}", remote), e))?;
        std::io::copy(&mut source, &mut dest)
            .map_err(|e| TransferError::from_io(&format!("write {}", remote), e))?;
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), TransferError> {
        let flags = Some(RenameFlags::OVERWRITE | RenameFlags::ATOMIC | RenameFlags::NATIVE);
        if self
            .sftp
            .rename(Path::new(from), Path::new(to), flags)
            .is_ok()
        {
            return Ok(());
        }
        // SFTPv3 servers refuse to overwrite; replace the old file explicitly
        if self.sftp.stat(Path::new(to)).is_ok() {
            self.sftp
                .unlink(Path::new(to))
                .map_err(|e| map_ssh(&format!("unlink {}", to), e))?;
        }
        self.sftp
            .rename(Path::new(from), Path::new(to), None)
            .map_err(|e| map_ssh(&format!("rename {} -> {}", from, to), e))
    }

    fn list(&mut self, dir: &str) -> Result<Vec<RemoteEntry>, TransferError> {
        let entries = self
            .sftp
            .readdir(Path::new(dir))
            .map_err(|e| map_ssh(&format!("readdir {}", dir), e))?;
        Ok(entries
            .into_iter()
            .filter_map(|(path, stat)| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                Some(RemoteEntry {
                    name,
                    is_dir: stat.is_dir(),
                })
            })
            .collect())
    }

    fn remove_file(&mut self, path: &str) -> Result<(), TransferError> {
        self.sftp
            .unlink(Path::new(path))
            .map_err(|e| map_ssh(&format!("unlink {}", path), e))
    }

    fn remove_dir(&mut self, path: &str) -> Result<(), TransferError> {
        self.sftp
            .rmdir(Path::new(path))
            .map_err(|e| map_ssh(&format!("rmdir {}", path), e))
    }

    fn close(self: Box<Self>) -> Result<(), TransferError> {
        let SftpSession { session, sftp } = *self;
        drop(sftp);
        session
            .disconnect(None, "done", None)
            .map_err(|e| map_ssh("disconnect", e))
    }
}
