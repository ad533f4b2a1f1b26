use std::fs::File;
use std::io::{self, Read, Seek};

/// A helper trait for things that implement both `Read` and `Seek`
pub trait SeekableRead: Seek + Read {}
impl<T> SeekableRead for T where T: Seek + Read {}

/// Indicates something that can be *reopened*. Importantly, reopening is
/// independent with respect to seeks and reads from the original object,
/// which makes it the way to run queries in parallel over one file.
pub trait Reopen: Sized {
    fn reopen(&self) -> io::Result<Self>;
}

/// A local file that remembers its path, so it can be reopened.
#[derive(Debug)]
pub struct ReopenableFile {
    pub path: String,
    pub file: File,
}

impl Reopen for ReopenableFile {
    fn reopen(&self) -> io::Result<Self> {
        Ok(ReopenableFile {
            path: self.path.clone(),
            file: File::open(&self.path)?,
        })
    }
}

impl Seek for ReopenableFile {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl Read for ReopenableFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn read_vectored(&mut self, bufs: &mut [io::IoSliceMut<'_>]) -> io::Result<usize> {
        self.file.read_vectored(bufs)
    }

    fn read_to_end(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        self.file.read_to_end(buf)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.file.read_exact(buf)
    }
}
