use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use thiserror::Error;

use crate::utils::file::remote_file::RemoteFile;
use crate::utils::file::reopen::{Reopen, ReopenableFile};

/// A bigWig data source: a local file or a remote URL.
///
/// Both variants expose the same seek/read surface; the remote variant
/// reads in buffered ranged requests and refuses end-relative seeks.
#[derive(Debug)]
pub enum Resource {
    Local(ReopenableFile),
    Remote(RemoteFile),
}

/// Possible errors encountered when opening a resource by URI
#[derive(Error, Debug)]
pub enum ResourceOpenError {
    #[error("unsupported scheme: {}", .0)]
    UnsupportedScheme(String),
    #[error("error occurred: {}", .0)]
    IoError(#[from] io::Error),
}

impl Resource {
    /// Opens a URI. `http://` and `https://` prefixes select the remote
    /// variant; `ftp://` is recognized but not supported; anything else
    /// is treated as a local path.
    pub fn open(uri: &str) -> Result<Resource, ResourceOpenError> {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            Ok(Resource::Remote(RemoteFile::new(uri)))
        } else if uri.starts_with("ftp://") {
            Err(ResourceOpenError::UnsupportedScheme("ftp".to_string()))
        } else {
            Ok(Resource::Local(ReopenableFile {
                path: uri.to_string(),
                file: File::open(uri)?,
            }))
        }
    }
}

impl Read for Resource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Resource::Local(file) => file.read(buf),
            Resource::Remote(remote) => remote.read(buf),
        }
    }
}

impl Seek for Resource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Resource::Local(file) => file.seek(pos),
            Resource::Remote(remote) => remote.seek(pos),
        }
    }
}

impl Reopen for Resource {
    fn reopen(&self) -> io::Result<Resource> {
        Ok(match self {
            Resource::Local(file) => Resource::Local(file.reopen()?),
            Resource::Remote(remote) => Resource::Remote(remote.reopen()?),
        })
    }
}
