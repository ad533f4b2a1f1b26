use std::error::Error;
use std::fmt;
use std::io::{self, Cursor, Read, Seek, SeekFrom};

use crate::utils::file::reopen::Reopen;

/// How many bytes one ranged request asks for. Reads larger than this
/// fetch exactly what they need instead.
const FETCH_SIZE: u64 = 64 * 1024;

/// Issues ranged reads against a remote resource.
///
/// [`HttpFetcher`] is the default; tests substitute an in-memory
/// implementation to exercise the remote path without a network.
pub trait RangeFetcher {
    /// Fetches up to `len` bytes starting at `start`. Returns fewer
    /// bytes only at the end of the resource.
    fn fetch_range(&self, start: u64, len: u64) -> io::Result<Vec<u8>>;
}

/// Fetches byte ranges over HTTP(S) with `Range` requests. Both partial
/// (206) and full (200) responses are accepted; redirects are followed.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    url: String,
}

impl HttpFetcher {
    pub fn new(url: &str) -> HttpFetcher {
        HttpFetcher {
            url: url.to_string(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct HttpStatusError(attohttpc::StatusCode);

impl fmt::Display for HttpStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "range request failed with status {}", self.0)
    }
}

impl Error for HttpStatusError {}

impl RangeFetcher for HttpFetcher {
    fn fetch_range(&self, start: u64, len: u64) -> io::Result<Vec<u8>> {
        let resp = attohttpc::get(&self.url)
            .header("range", format!("bytes={}-{}", start, start + len - 1))
            .send()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        if !resp.is_success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                HttpStatusError(resp.status()),
            ));
        }
        resp.bytes()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

/// Whether an i/o error originated in the HTTP layer.
pub(crate) fn is_network_error(e: &io::Error) -> bool {
    e.get_ref()
        .map_or(false, |inner| {
            inner.is::<attohttpc::Error>() || inner.is::<HttpStatusError>()
        })
}

/// A remote file read over ranged requests.
///
/// Keeps a logical position independent of any connection, plus one
/// window of fetched bytes. A read with an empty window fetches 64 KiB
/// at the current position; a seek landing inside the window keeps it,
/// any other seek drops it. End-relative seeks are refused: the remote
/// size is not discovered eagerly.
#[derive(Debug)]
pub struct RemoteFile<F = HttpFetcher> {
    url: String,
    fetcher: F,
    position: u64,
    // (file offset the window starts at, the window)
    window: Option<(u64, Cursor<Vec<u8>>)>,
}

impl RemoteFile<HttpFetcher> {
    pub fn new(url: &str) -> RemoteFile {
        RemoteFile {
            url: url.to_string(),
            fetcher: HttpFetcher::new(url),
            position: 0,
            window: None,
        }
    }
}

impl<F: RangeFetcher> RemoteFile<F> {
    pub fn with_fetcher(url: &str, fetcher: F) -> RemoteFile<F> {
        RemoteFile {
            url: url.to_string(),
            fetcher,
            position: 0,
            window: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl<F: RangeFetcher> Read for RemoteFile<F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let exhausted = match &self.window {
            Some((_, cursor)) => cursor.position() >= cursor.get_ref().len() as u64,
            None => true,
        };
        if exhausted {
            let len = (buf.len() as u64).max(FETCH_SIZE);
            let bytes = self.fetcher.fetch_range(self.position, len)?;
            if bytes.is_empty() {
                return Ok(0);
            }
            self.window = Some((self.position, Cursor::new(bytes)));
        }
        let read = match self.window.as_mut() {
            Some((_, cursor)) => cursor.read(buf)?,
            None => 0,
        };
        self.position += read as u64;
        Ok(read)
    }
}

impl<F: RangeFetcher> Seek for RemoteFile<F> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = match pos {
            SeekFrom::Start(s) => s,
            SeekFrom::Current(s) => {
                if s >= 0 {
                    self.position.checked_add(s as u64).ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidInput, "seek past u64::MAX")
                    })?
                } else {
                    self.position.checked_sub(s.unsigned_abs()).ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidInput, "seek before byte 0")
                    })?
                }
            }
            SeekFrom::End(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "end-relative seeks are not supported on remote resources",
                ));
            }
        };
        if let Some((window_start, cursor)) = self.window.as_mut() {
            let window_end = *window_start + cursor.get_ref().len() as u64;
            if *window_start <= self.position && self.position < window_end {
                cursor.set_position(self.position - *window_start);
            } else {
                self.window = None;
            }
        }
        Ok(self.position)
    }
}

impl<F: RangeFetcher + Clone> Reopen for RemoteFile<F> {
    fn reopen(&self) -> io::Result<RemoteFile<F>> {
        Ok(RemoteFile {
            url: self.url.clone(),
            fetcher: self.fetcher.clone(),
            position: 0,
            window: None,
        })
    }
}

impl<F: RangeFetcher + Clone> Clone for RemoteFile<F> {
    fn clone(&self) -> Self {
        RemoteFile {
            url: self.url.clone(),
            fetcher: self.fetcher.clone(),
            position: 0,
            window: None,
        }
    }
}
