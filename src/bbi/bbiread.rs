use std::io::{self, SeekFrom};

use bytes::{Buf, BytesMut};
use libdeflater::Decompressor;
use thiserror::Error;

use crate::bbi::{TotalSummary, ZoomHeader, BIGWIG_MAGIC, CHROM_TREE_MAGIC};
use crate::utils::file::remote_file::is_network_error;
use crate::utils::file::reopen::SeekableRead;
use crate::utils::file::resource::ResourceOpenError;

/// Sentinel returned by [`tid`][BigWigInfo::tid] for unknown chromosome
/// names.
pub const TID_NONE: u32 = u32::MAX;

/// A pointer to one data block in the file, as recorded by an index leaf.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Block {
    pub(crate) offset: u64,
    pub(crate) size: u64,
}

impl Block {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Header of a bigWig file.
///
/// The offsets are where the remaining file sections live; reading data
/// is available through the higher-level methods on
/// [`BigWigRead`][crate::BigWigRead].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BigWigHeader {
    pub version: u16,
    pub zoom_levels: u16,
    pub chrom_tree_offset: u64,
    pub full_data_offset: u64,
    pub full_index_offset: u64,
    pub field_count: u16,
    pub defined_field_count: u16,
    pub auto_sql_offset: u64,
    pub total_summary_offset: u64,
    pub uncompress_buf_size: u32,
    pub extension_offset: u64,
}

/// Information on a chromosome in a bigWig file
#[derive(Clone, Debug)]
pub struct ChromInfo {
    pub name: String,
    pub length: u32,
    pub(crate) id: u32,
}

impl PartialEq for ChromInfo {
    fn eq(&self, other: &ChromInfo) -> bool {
        self.name == other.name
    }
}

/// Info on a bigWig file: header, zoom levels, chromosomes, and the
/// file-wide summary (when the file carries one).
#[derive(Clone, Debug)]
pub struct BigWigInfo {
    pub header: BigWigHeader,
    pub zoom_headers: Vec<ZoomHeader>,
    pub chrom_info: Vec<ChromInfo>,
    pub total_summary: Option<TotalSummary>,
}

impl BigWigInfo {
    /// The dense id of the named chromosome, or [`TID_NONE`].
    pub fn tid(&self, chrom_name: &str) -> u32 {
        self.chrom_info
            .iter()
            .find(|c| c.name == chrom_name)
            .map(|c| c.id)
            .unwrap_or(TID_NONE)
    }

    pub(crate) fn chrom_id(&self, chrom_name: &str) -> Result<u32, BigWigReadError> {
        self.chrom_info
            .iter()
            .find(|c| c.name == chrom_name)
            .map(|c| c.id)
            .ok_or_else(|| BigWigReadError::NoSuchChromosome(chrom_name.to_owned()))
    }
}

/// Possible errors encountered when opening a bigWig file to read
#[derive(Error, Debug)]
pub enum BigWigOpenError {
    #[error("the file is not a bigWig (invalid magic)")]
    NotABigWig,
    #[error("the chromosome tree is invalid: {}", .0)]
    CorruptChromTree(String),
    #[error("unsupported scheme: {}", .0)]
    UnsupportedScheme(String),
    #[error("error occurred: {}", .0)]
    IoError(#[from] io::Error),
}

impl From<ResourceOpenError> for BigWigOpenError {
    fn from(error: ResourceOpenError) -> Self {
        match error {
            ResourceOpenError::UnsupportedScheme(s) => BigWigOpenError::UnsupportedScheme(s),
            ResourceOpenError::IoError(e) => BigWigOpenError::IoError(e),
        }
    }
}

/// Possible errors encountered when reading data from a bigWig file
#[derive(Error, Debug)]
pub enum BigWigReadError {
    #[error("the passed chromosome ({}) was not found", .0)]
    NoSuchChromosome(String),
    #[error("invalid {} magic: expected {:#010x}, found {:#010x}", .kind, .expected, .found)]
    BadMagic {
        kind: &'static str,
        expected: u32,
        found: u32,
    },
    #[error("unexpected end of file")]
    UnexpectedEof,
    #[error("the index is invalid: {}", .0)]
    CorruptIndex(String),
    #[error("data block shorter than its declared header")]
    TruncatedBlock,
    #[error("unknown section type: {}", .0)]
    UnknownSectionType(u8),
    #[error("failed to decompress block: {}", .0)]
    Decompression(String),
    #[error("end-relative seeks are not supported on remote resources")]
    UnsupportedSeek,
    #[error("network error: {}", .0)]
    Network(String),
    #[error("error occurred: {}", .0)]
    IoError(io::Error),
}

impl From<io::Error> for BigWigReadError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => BigWigReadError::UnexpectedEof,
            io::ErrorKind::Unsupported => BigWigReadError::UnsupportedSeek,
            _ if is_network_error(&e) => BigWigReadError::Network(e.to_string()),
            _ => BigWigReadError::IoError(e),
        }
    }
}

/// Reads the header, zoom headers, total summary, and chromosome tree.
pub(crate) fn read_info<R: SeekableRead>(file: &mut R) -> Result<BigWigInfo, BigWigOpenError> {
    file.seek(SeekFrom::Start(0))?;

    let mut header_data = BytesMut::zeroed(64);
    file.read_exact(&mut header_data)?;

    let magic = header_data.get_u32_le();
    if magic != BIGWIG_MAGIC {
        return Err(BigWigOpenError::NotABigWig);
    }

    let version = header_data.get_u16_le();
    let zoom_levels = header_data.get_u16_le();
    let chrom_tree_offset = header_data.get_u64_le();
    let full_data_offset = header_data.get_u64_le();
    let full_index_offset = header_data.get_u64_le();
    let field_count = header_data.get_u16_le();
    let defined_field_count = header_data.get_u16_le();
    let auto_sql_offset = header_data.get_u64_le();
    let total_summary_offset = header_data.get_u64_le();
    let uncompress_buf_size = header_data.get_u32_le();
    let extension_offset = header_data.get_u64_le();

    let header = BigWigHeader {
        version,
        zoom_levels,
        chrom_tree_offset,
        full_data_offset,
        full_index_offset,
        field_count,
        defined_field_count,
        auto_sql_offset,
        total_summary_offset,
        uncompress_buf_size,
        extension_offset,
    };

    let zoom_headers = read_zoom_headers(file, &header)?;

    let total_summary = if header.total_summary_offset > 0 {
        file.seek(SeekFrom::Start(header.total_summary_offset))?;
        let mut summary_data = BytesMut::zeroed(40);
        file.read_exact(&mut summary_data)?;
        let bases_covered = summary_data.get_u64_le();
        let min_val = summary_data.get_f64_le();
        let max_val = summary_data.get_f64_le();
        let sum_data = summary_data.get_f64_le();
        let sum_squares = summary_data.get_f64_le();
        Some(TotalSummary {
            bases_covered,
            min_val,
            max_val,
            sum_data,
            sum_squares,
        })
    } else {
        None
    };

    let chrom_info = read_chrom_tree(file, &header)?;

    Ok(BigWigInfo {
        header,
        zoom_headers,
        chrom_info,
        total_summary,
    })
}

fn read_zoom_headers<R: SeekableRead>(
    file: &mut R,
    header: &BigWigHeader,
) -> io::Result<Vec<ZoomHeader>> {
    let mut header_data = BytesMut::zeroed((header.zoom_levels as usize) * 24);
    file.read_exact(&mut header_data)?;

    let mut zoom_headers = vec![];
    for _ in 0..header.zoom_levels {
        let reduction_level = header_data.get_u32_le();
        let _reserved = header_data.get_u32_le();
        let data_offset = header_data.get_u64_le();
        let index_offset = header_data.get_u64_le();

        zoom_headers.push(ZoomHeader {
            reduction_level,
            data_offset,
            index_offset,
            index: None,
        });
    }

    Ok(zoom_headers)
}

fn read_chrom_tree<R: SeekableRead>(
    file: &mut R,
    header: &BigWigHeader,
) -> Result<Vec<ChromInfo>, BigWigOpenError> {
    file.seek(SeekFrom::Start(header.chrom_tree_offset))?;

    let mut header_data = BytesMut::zeroed(32);
    file.read_exact(&mut header_data)?;

    let magic = header_data.get_u32_le();
    if magic != CHROM_TREE_MAGIC {
        return Err(BigWigOpenError::CorruptChromTree("invalid magic".to_owned()));
    }

    let _block_size = header_data.get_u32_le();
    let key_size = header_data.get_u32_le();
    let val_size = header_data.get_u32_le();
    let item_count = header_data.get_u64_le();
    let _reserved = header_data.get_u64_le();

    if val_size != 8 {
        return Err(BigWigOpenError::CorruptChromTree(format!(
            "unexpected value size: {}",
            val_size
        )));
    }

    let mut chroms: Vec<Option<ChromInfo>> = Vec::with_capacity(item_count as usize);
    let leaves_read = read_chrom_tree_block(file, &mut chroms, key_size)?;
    if leaves_read != item_count {
        return Err(BigWigOpenError::CorruptChromTree(format!(
            "expected {} chromosomes, found {}",
            item_count, leaves_read
        )));
    }

    let mut chrom_info = Vec::with_capacity(chroms.len());
    for (id, chrom) in chroms.into_iter().enumerate() {
        match chrom {
            Some(chrom) => chrom_info.push(chrom),
            None => {
                return Err(BigWigOpenError::CorruptChromTree(format!(
                    "no chromosome with id {}",
                    id
                )))
            }
        }
    }
    Ok(chrom_info)
}

fn read_chrom_tree_block<R: SeekableRead>(
    f: &mut R,
    chroms: &mut Vec<Option<ChromInfo>>,
    key_size: u32,
) -> Result<u64, BigWigOpenError> {
    let mut node_header = BytesMut::zeroed(4);
    f.read_exact(&mut node_header)?;

    let is_leaf = node_header.get_u8();
    let _reserved = node_header.get_u8();
    let count = node_header.get_u16_le();

    let mut bytes = BytesMut::zeroed((key_size as usize + 8) * (count as usize));
    f.read_exact(&mut bytes)?;

    if is_leaf == 1 {
        for _ in 0..count {
            let raw_name = &bytes.as_ref()[0..(key_size as usize)];
            let name_len = raw_name
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(raw_name.len());
            let name = match std::str::from_utf8(&raw_name[..name_len]) {
                Ok(s) => s.to_owned(),
                Err(_) => {
                    return Err(BigWigOpenError::CorruptChromTree(
                        "chromosome name is not valid utf-8".to_owned(),
                    ))
                }
            };
            bytes.advance(key_size as usize);

            let id = bytes.get_u32_le();
            let length = bytes.get_u32_le();
            if chroms.len() <= id as usize {
                chroms.resize(id as usize + 1, None);
            }
            chroms[id as usize] = Some(ChromInfo { name, length, id });
        }
        Ok(count as u64)
    } else {
        // Keys are only needed when searching by name; a full enumeration
        // just follows every child.
        let mut children: Vec<u64> = Vec::with_capacity(count as usize);
        for _ in 0..count {
            bytes.advance(key_size as usize);
            children.push(bytes.get_u64_le());
        }

        let mut total = 0;
        for child in children {
            f.seek(SeekFrom::Start(child))?;
            total += read_chrom_tree_block(f, chroms, key_size)?;
        }
        Ok(total)
    }
}

/// Gets the data (uncompressed, if applicable) from a given block
pub(crate) fn read_block_data<R: SeekableRead>(
    read: &mut R,
    uncompress_buf_size: usize,
    block: &Block,
) -> Result<Vec<u8>, BigWigReadError> {
    read.seek(SeekFrom::Start(block.offset))?;

    let mut raw_data = vec![0u8; block.size as usize];
    read.read_exact(&mut raw_data)?;

    if uncompress_buf_size > 0 {
        let mut decompressor = Decompressor::new();
        let mut outbuf = vec![0u8; uncompress_buf_size];
        let decompressed = decompressor
            .zlib_decompress(&raw_data, &mut outbuf)
            .map_err(|e| BigWigReadError::Decompression(e.to_string()))?;
        outbuf.truncate(decompressed);
        Ok(outbuf)
    } else {
        Ok(raw_data)
    }
}
