//! Remote archive access
//!
//! The gridded archive is published over anonymous FTP; some mirrors expose the
//! same tree over HTTP. Both are hidden behind [`RemoteSource`] so the acquisition
//! loop only deals with paths relative to the archive root.

use crate::config::AcquisitionConfig;
use crate::types::{GeoError, GeoResult};
use reqwest::Url;
use std::io::Write;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Status};

/// A place granules can be copied from
pub trait RemoteSource {
    /// Copy the object at `remote_path` (relative to the root) into `sink`,
    /// returning the number of bytes transferred
    fn fetch(&mut self, remote_path: &str, sink: &mut dyn Write) -> GeoResult<u64>;

    /// Human readable location of `remote_path`, used in logs
    fn describe(&self, remote_path: &str) -> String;
}

impl<T: RemoteSource + ?Sized> RemoteSource for Box<T> {
    fn fetch(&mut self, remote_path: &str, sink: &mut dyn Write) -> GeoResult<u64> {
        (**self).fetch(remote_path, sink)
    }

    fn describe(&self, remote_path: &str) -> String {
        (**self).describe(remote_path)
    }
}

/// Connection settings shared by all source kinds
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub timeout: Duration,
    pub user: String,
    pub password: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            user: "anonymous".to_string(),
            password: "anonymous".to_string(),
        }
    }
}

impl From<&AcquisitionConfig> for SourceSettings {
    fn from(config: &AcquisitionConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            user: config.ftp_user.clone(),
            password: config.ftp_password.clone(),
        }
    }
}

/// Pick a source implementation from the root URL scheme
pub fn connect(root: &str, settings: SourceSettings) -> GeoResult<Box<dyn RemoteSource>> {
    let url = Url::parse(root).map_err(|e| GeoError::Config(format!("invalid remote root '{}': {}", root, e)))?;

    match url.scheme() {
        "ftp" => Ok(Box::new(FtpSource::new(&url, settings)?)),
        "http" | "https" => Ok(Box::new(HttpSource::new(root, settings)?)),
        other => Err(GeoError::Config(format!("unsupported remote scheme '{}'", other))),
    }
}

/// Anonymous FTP archive, connected on first use
pub struct FtpSource {
    host: String,
    port: u16,
    base_path: String,
    settings: SourceSettings,
    stream: Option<FtpStream>,
}

impl FtpSource {
    pub fn new(url: &Url, settings: SourceSettings) -> GeoResult<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| GeoError::Config(format!("remote root '{}' has no host", url)))?
            .to_string();

        Ok(Self {
            host,
            port: url.port().unwrap_or(21),
            base_path: url.path().trim_end_matches('/').to_string(),
            settings,
            stream: None,
        })
    }

    fn resolve(&self) -> GeoResult<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| GeoError::RemoteFetch(format!("cannot resolve {}: {}", self.host, e)))?
            .next()
            .ok_or_else(|| GeoError::RemoteFetch(format!("no address for {}", self.host)))
    }

    fn open(&self) -> GeoResult<FtpStream> {
        let addr = self.resolve()?;
        log::debug!("Connecting to ftp://{}:{}", self.host, self.port);

        let ftp_err = |e: FtpError| GeoError::RemoteFetch(format!("{}: {}", self.host, e));

        let mut stream = FtpStream::connect_timeout(addr, self.settings.timeout).map_err(ftp_err)?;
        stream
            .get_ref()
            .set_read_timeout(Some(self.settings.timeout))
            .map_err(GeoError::Io)?;
        stream
            .login(&self.settings.user, &self.settings.password)
            .map_err(ftp_err)?;
        stream.transfer_type(FileType::Binary).map_err(ftp_err)?;

        Ok(stream)
    }

    fn transfer(stream: &mut FtpStream, path: &str, sink: &mut dyn Write) -> Result<u64, TransferFailure> {
        let failed = |e: FtpError| TransferFailure {
            reusable: is_missing_file(&e),
            error: GeoError::RemoteFetch(format!("{}: {}", path, e)),
        };

        let mut data = stream.retr_as_stream(path).map_err(failed)?;
        let copied = std::io::copy(&mut data, sink);
        // Always close the data channel so the control connection stays usable
        let finalized = stream.finalize_retr_stream(data).map_err(failed);

        let bytes = copied.map_err(|e| TransferFailure {
            reusable: false,
            error: GeoError::RemoteFetch(format!("{}: {}", path, e)),
        })?;
        finalized?;
        Ok(bytes)
    }
}

/// A failed RETR and whether the control connection survived it
struct TransferFailure {
    error: GeoError,
    reusable: bool,
}

/// 550 on RETR: the server answered normally, the object just isn't there
fn is_missing_file(e: &FtpError) -> bool {
    matches!(e, FtpError::UnexpectedResponse(response) if response.status == Status::FileUnavailable)
}

impl RemoteSource for FtpSource {
    fn fetch(&mut self, remote_path: &str, sink: &mut dyn Write) -> GeoResult<u64> {
        let path = format!("{}/{}", self.base_path, remote_path);

        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => self.open()?,
        };

        match Self::transfer(&mut stream, &path, sink) {
            Ok(bytes) => {
                self.stream = Some(stream);
                Ok(bytes)
            }
            Err(TransferFailure { error, reusable: true }) => {
                self.stream = Some(stream);
                Err(error)
            }
            Err(TransferFailure { error, reusable: false }) => {
                // Drop the connection so the next granule reconnects
                let _ = stream.quit();
                Err(error)
            }
        }
    }

    fn describe(&self, remote_path: &str) -> String {
        format!("ftp://{}:{}{}/{}", self.host, self.port, self.base_path, remote_path)
    }
}

impl Drop for FtpSource {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.quit();
        }
    }
}

/// HTTP(S) mirror of the archive
pub struct HttpSource {
    root: String,
    client: reqwest::blocking::Client,
}

impl HttpSource {
    pub fn new(root: &str, settings: SourceSettings) -> GeoResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("himawari-geoss/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GeoError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            root: root.trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl RemoteSource for HttpSource {
    fn fetch(&mut self, remote_path: &str, sink: &mut dyn Write) -> GeoResult<u64> {
        let url = self.describe(remote_path);

        let mut response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| GeoError::RemoteFetch(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(GeoError::RemoteFetch(format!(
                "HTTP {} {}: {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or(""),
                url
            )));
        }

        response
            .copy_to(sink)
            .map_err(|e| GeoError::RemoteFetch(format!("Failed to read response body: {}", e)))
    }

    fn describe(&self, remote_path: &str) -> String {
        format!("{}/{}", self.root, remote_path)
    }
}
