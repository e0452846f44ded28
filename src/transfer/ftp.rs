use std::fs::File;
use std::io::BufReader;
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use suppaftp::list::File as ListEntry;
use suppaftp::types::{FileType, FtpResult};
use suppaftp::{FtpError, FtpStream};
use tracing::debug;

use super::sftp::connect_tcp;
use super::{RemoteEntry, RemoteSession, RemoteTarget, TransferError};
use crate::config::Endpoint;
use crate::types::TargetKind;

const NOT_LOGGED_IN: u32 = 530;

/// Transient reply codes that mean the control or data connection broke.
fn is_connection_reply(code: u32) -> bool {
    matches!(code, 421 | 425 | 426)
}

fn map_ftp(context: &str, e: FtpError) -> TransferError {
    let message = format!("{}: {}", context, e);
    match e {
        FtpError::ConnectionError(io) => TransferError::from_io(context, io),
        FtpError::UnexpectedResponse(ref response) => {
            let code = response.status.code();
            if code == NOT_LOGGED_IN {
                TransferError::AuthFailed(message)
            } else if is_connection_reply(code) {
                TransferError::ConnectionFailed(message)
            } else {
                TransferError::RemoteRejected(message)
            }
        }
        FtpError::InvalidAddress(_) => TransferError::ConnectionFailed(message),
        _ => TransferError::RemoteRejected(message),
    }
}

/// Opens a passive-mode data connection with the same timeouts as the control one.
fn data_stream(addr: SocketAddr, timeout: Duration) -> FtpResult<TcpStream> {
    let stream = TcpStream::connect_timeout(&addr, timeout).map_err(FtpError::ConnectionError)?;
    stream
        .set_read_timeout(Some(timeout))
        .map_err(FtpError::ConnectionError)?;
    stream
        .set_write_timeout(Some(timeout))
        .map_err(FtpError::ConnectionError)?;
    Ok(stream)
}

/// Plain FTP server reached with username and password.
#[derive(Debug, Clone)]
pub struct FtpTarget {
    endpoint: Endpoint,
}

impl FtpTarget {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

impl RemoteTarget for FtpTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Ftp
    }

    fn connect(&self) -> Result<Box<dyn RemoteSession>, TransferError> {
        let tcp = connect_tcp(&self.endpoint)?;
        let timeout = self.endpoint.timeout;
        let mut stream = FtpStream::connect_with_stream(tcp)
            .map_err(|e| map_ftp("greeting", e))?
            .passive_stream_builder(move |addr| data_stream(addr, timeout));
        stream
            .login(&self.endpoint.username, &self.endpoint.password)
            .map_err(|e| match map_ftp("login", e) {
                TransferError::RemoteRejected(m) => TransferError::AuthFailed(m),
                other => other,
            })?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| map_ftp("TYPE I", e))?;
        let home = stream.pwd().map_err(|e| map_ftp("PWD", e))?;
        debug!("FTP connected to {} ({})", self.endpoint, home);
        Ok(Box::new(FtpSession { stream, home }))
    }
}

struct FtpSession {
    stream: FtpStream,
    home: String,
}

impl RemoteSession for FtpSession {
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
            if let Err(e) = self.stream.mkdir(&current) {
                // MKD fails for existing directories; CWD tells them apart
                self.stream
                    .cwd(&current)
                    .map_err(|_| map_ftp(&format!("MKD {}", current), e))?;
                self.stream
                    .cwd(&self.home)
                    .map_err(|e| map_ftp("CWD home", e))?;
            }
        }
        Ok(())
    }

    fn put(&mut self, local: &Path, remote: &str) -> Result<(), TransferError> {
        let file = File::open(local).map_err(|e| {
            TransferError::RemoteRejected(format!("cannot read {:?}: {}", local, e))
        })?;
        let mut reader = BufReader::new(file);
        self.stream
            .put_file(remote, &mut reader)
            .map_err(|e| map_ftp(&format!("STOR {}", remote), e))?;
        Ok(())
    }

    /// RNFR/RNTO does not replace on every server, so an existing target is
    /// deleted first. The final name is briefly absent in between.
    fn rename(&mut self, from: &str, to: &str) -> Result<(), TransferError> {
        if self.stream.rm(to).is_ok() {
            debug!("Replaced existing {}", to);
        }
        self.stream
            .rename(from, to)
            .map_err(|e| map_ftp(&format!("RNFR {} RNTO {}", from, to), e))
    }

    fn list(&mut self, dir: &str) -> Result<Vec<RemoteEntry>, TransferError> {
        let lines = self
            .stream
            .list(Some(dir))
            .map_err(|e| map_ftp(&format!("LIST {}", dir), e))?;
        Ok(parse_listing(&lines))
    }

    fn remove_file(&mut self, path: &str) -> Result<(), TransferError> {
        self.stream
            .rm(path)
            .map_err(|e| map_ftp(&format!("DELE {}", path), e))
    }

    fn remove_dir(&mut self, path: &str) -> Result<(), TransferError> {
        self.stream
            .rmdir(path)
            .map_err(|e| map_ftp(&format!("RMD {}", path), e))
    }

    fn close(mut self: Box<Self>) -> Result<(), TransferError> {
        self.stream.quit().map_err(|e| map_ftp("QUIT", e))
    }
}

/// Unix or DOS `LIST` lines to entries. Unparsable lines and the `.` and
/// `..` entries are dropped.
fn parse_listing(lines: &[String]) -> Vec<RemoteEntry> {
    lines
        .iter()
        .filter_map(|line| match ListEntry::from_str(line) {
            Ok(file) => Some(file),
            Err(e) => {
                debug!("Unparsable LIST line {:?}: {}", line, e);
                None
            }
        })
        .filter(|file| file.name() != "." && file.name() != "..")
        .map(|file| RemoteEntry {
            name: file.name().to_string(),
            is_dir: file.is_directory(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use suppaftp::Status;
    use suppaftp::types::Response;

    #[test]
    fn not_logged_in_is_auth_failure() {
        let e = map_ftp(
            "login",
            FtpError::UnexpectedResponse(Response::new(Status::NotLoggedIn, Vec::new())),
        );
        assert_eq!(e.kind(), "AuthFailed");
    }

    #[test]
    fn file_errors_are_rejections() {
        let e = map_ftp(
            "STOR",
            FtpError::UnexpectedResponse(Response::new(Status::FileUnavailable, Vec::new())),
        );
        assert_eq!(e.kind(), "RemoteRejected");
    }

    #[test]
    fn dropped_connections_are_retryable() {
        let e = map_ftp(
            "STOR",
            FtpError::ConnectionError(std::io::Error::from(std::io::ErrorKind::TimedOut)),
        );
        assert!(e.is_retryable());
        let e = map_ftp(
            "STOR",
            FtpError::UnexpectedResponse(Response::new(Status::NotAvailable, Vec::new())),
        );
        assert!(e.is_retryable());
    }

    #[test]
    fn data_connections_carry_the_endpoint_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let timeout = Duration::from_secs(7);
        let stream = data_stream(addr, timeout).unwrap();
        assert_eq!(stream.read_timeout().unwrap(), Some(timeout));
        assert_eq!(stream.write_timeout().unwrap(), Some(timeout));
    }

    #[test]
    fn refused_data_connection_is_retryable() {
        // Bind then drop to get a port nobody listens on
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let err = data_stream(addr, Duration::from_secs(1)).unwrap_err();
        assert!(map_ftp("STOR", err).is_retryable());
    }

    #[test]
    fn listing_keeps_names_and_directory_flags() {
        let lines: Vec<String> = [
            "drwxr-xr-x    2 ftp      ftp          4096 Jul 01 10:00 2024-07-01",
            "drwxr-xr-x    2 ftp      ftp          4096 Jul 01 10:00 .",
            "-rw-r--r--    1 ftp      ftp         15360 Jul 01 10:00 HI.png",
            "total 8",
        ]
        .iter()
        .map(|l| l.to_string())
        .collect();

        assert_eq!(
            parse_listing(&lines),
            vec![
                RemoteEntry {
                    name: "2024-07-01".into(),
                    is_dir: true,
                },
                RemoteEntry {
                    name: "HI.png".into(),
                    is_dir: false,
                },
            ]
        );
    }
}
