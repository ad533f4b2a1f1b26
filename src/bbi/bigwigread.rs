use std::fs::File;
use std::vec::Vec;

use bytes::Buf;

use crate::bbi::bbiread::{
    read_block_data, read_info, BigWigInfo, BigWigOpenError, BigWigReadError, Block, ChromInfo,
};
use crate::bbi::cirtree::{read_index, search_index, RTreeIndex};
use crate::bbi::Value;
use crate::utils::file::reopen::{Reopen, ReopenableFile, SeekableRead};
use crate::utils::file::resource::Resource;

/// A read-only handle to a bigWig file.
///
/// The handle owns the underlying resource and is a mutable cursor over
/// it: queries take `&mut self` and must not be interleaved without
/// external serialization. Independent handles (for example through
/// [`Reopen`]) share nothing.
pub struct BigWigRead<R> {
    pub(crate) info: BigWigInfo,
    pub(crate) read: R,
    pub(crate) index: Option<RTreeIndex>,
}

impl BigWigRead<ReopenableFile> {
    /// Opens a local bigWig file from a path.
    pub fn open_file(path: &str) -> Result<Self, BigWigOpenError> {
        let reopen = ReopenableFile {
            path: path.to_string(),
            file: File::open(path)?,
        };
        let b = BigWigRead::open(reopen);
        if b.is_err() {
            eprintln!("Error when opening: {}", path);
        }
        b
    }
}

impl BigWigRead<Resource> {
    /// Opens a bigWig from a URI. `http://` and `https://` select the
    /// remote resource; anything else is treated as a local path.
    pub fn open_uri(uri: &str) -> Result<Self, BigWigOpenError> {
        BigWigRead::open(Resource::open(uri)?)
    }
}

impl<R: Reopen> Reopen for BigWigRead<R> {
    fn reopen(&self) -> std::io::Result<Self> {
        Ok(BigWigRead {
            info: self.info.clone(),
            read: self.read.reopen()?,
            index: self.index.clone(),
        })
    }
}

impl<R: SeekableRead> BigWigRead<R> {
    /// Opens a bigWig file for any type that implements both `Read` and
    /// `Seek`.
    pub fn open(mut read: R) -> Result<Self, BigWigOpenError> {
        let info = read_info(&mut read)?;
        Ok(BigWigRead {
            info,
            read,
            index: None,
        })
    }

    /// Gets basic info about the bigWig file
    pub fn info(&self) -> &BigWigInfo {
        &self.info
    }

    pub fn chroms(&self) -> &[ChromInfo] {
        &self.info.chrom_info
    }

    /// The dense id of the named chromosome, or
    /// [`TID_NONE`][crate::TID_NONE].
    pub fn tid_of(&self, chrom_name: &str) -> u32 {
        self.info.tid(chrom_name)
    }

    /// All blocks overlapping `tid:start-end`, loading the main index on
    /// first use.
    pub(crate) fn overlapping_blocks(
        &mut self,
        tid: u32,
        start: u32,
        end: u32,
    ) -> Result<Vec<Block>, BigWigReadError> {
        let index_offset = self.info.header.full_index_offset;
        let BigWigRead { read, index, .. } = self;
        if index.is_none() {
            *index = Some(read_index(read, index_offset)?);
        }
        let index = index.as_mut().unwrap();
        search_index(read, index, tid, start, end)
    }

    /// Returns the intervals overlapping `chrom:start-end`, in index
    /// traversal order.
    ///
    /// Interval boundaries are reported as stored in the file; an
    /// interval straddling the query boundary is not clamped.
    pub fn get_interval<'a>(
        &'a mut self,
        chrom_name: &str,
        start: u32,
        end: u32,
    ) -> Result<impl Iterator<Item = Result<Value, BigWigReadError>> + 'a, BigWigReadError> {
        let tid = self.info.chrom_id(chrom_name)?;
        let blocks = if start < end {
            self.overlapping_blocks(tid, start, end)?
        } else {
            Vec::new()
        };
        Ok(IntervalIter {
            bigwig: self,
            blocks: blocks.into_iter(),
            vals: Vec::new().into_iter(),
            tid,
            start,
            end,
        })
    }

    /// Returns the same intervals as [`get_interval`][Self::get_interval],
    /// in batches of up to `blocks_per_iteration` data blocks each.
    ///
    /// Concatenating every batch yields the same sequence as
    /// [`get_interval`][Self::get_interval], for any batch size. A block
    /// read failure is yielded as the final item. An unknown chromosome
    /// yields no batches rather than an error.
    pub fn get_interval_batches<'a>(
        &'a mut self,
        chrom_name: &str,
        start: u32,
        end: u32,
        blocks_per_iteration: usize,
    ) -> Result<IntervalBatchIter<'a, R>, BigWigReadError> {
        let tid = self.info.tid(chrom_name);
        let blocks = if tid != crate::bbi::bbiread::TID_NONE && start < end {
            self.overlapping_blocks(tid, start, end)?
        } else {
            Vec::new()
        };
        Ok(IntervalBatchIter {
            bigwig: self,
            blocks,
            offset: 0,
            blocks_per_iteration: blocks_per_iteration.max(1),
            failed: false,
            tid,
            start,
            end,
        })
    }

    /// Returns the values between `start` and `end` as `(position, value)`
    /// pairs, clamped to the query.
    ///
    /// With `include_na`, every position gets an entry, with
    /// `f32::NAN` where the file has no data; otherwise only covered
    /// positions appear.
    pub fn values(
        &mut self,
        chrom_name: &str,
        start: u32,
        end: u32,
        include_na: bool,
    ) -> Result<Vec<(u32, f32)>, BigWigReadError> {
        let tid = self.info.chrom_id(chrom_name)?;
        if start >= end {
            return Ok(Vec::new());
        }

        let blocks = self.overlapping_blocks(tid, start, end)?;
        let mut intervals = Vec::new();
        for block in blocks {
            intervals.extend(get_block_values(self, &block, tid, start, end)?);
        }

        if include_na {
            let mut values = vec![f32::NAN; (end - start) as usize];
            for v in &intervals {
                let clamped_start = v.start.max(start);
                let clamped_end = v.end.min(end);
                if clamped_start >= clamped_end {
                    continue;
                }
                for slot in &mut values[(clamped_start - start) as usize..(clamped_end - start) as usize]
                {
                    *slot = v.value;
                }
            }
            Ok(values
                .into_iter()
                .enumerate()
                .map(|(i, value)| (start + i as u32, value))
                .collect())
        } else {
            let mut values = Vec::new();
            for v in &intervals {
                let clamped_start = v.start.max(start);
                let clamped_end = v.end.min(end);
                for pos in clamped_start..clamped_end {
                    values.push((pos, v.value));
                }
            }
            Ok(values)
        }
    }
}

/// Reads and parses one data block, keeping the records that overlap the
/// query.
pub(crate) fn get_block_values<R: SeekableRead>(
    bigwig: &mut BigWigRead<R>,
    block: &Block,
    tid: u32,
    start: u32,
    end: u32,
) -> Result<Vec<Value>, BigWigReadError> {
    let uncompress_buf_size = bigwig.info.header.uncompress_buf_size as usize;
    let data = read_block_data(&mut bigwig.read, uncompress_buf_size, block)?;
    parse_block_values(&data, tid, start, end)
}

/// Parses an (uncompressed) data block into the records overlapping
/// `tid:start-end`, unclamped.
///
/// A block whose section header names another chromosome is skipped
/// wholesale: an index child's bounding box may reach into a neighboring
/// chromosome. A record tail shorter than one record ends the block
/// without error.
///
/// Note that fixedStep records start at `section.start + step`, not at
/// `section.start`: the reference implementation applies the step before
/// emitting the first record, and every reader has to follow suit.
pub(crate) fn parse_block_values(
    data: &[u8],
    tid: u32,
    start: u32,
    end: u32,
) -> Result<Vec<Value>, BigWigReadError> {
    if data.len() < 24 {
        return Err(BigWigReadError::TruncatedBlock);
    }

    let mut header = &data[..24];
    let chrom_id = header.get_u32_le();
    let section_start = header.get_u32_le();
    let _section_end = header.get_u32_le();
    let item_step = header.get_u32_le();
    let item_span = header.get_u32_le();
    let section_type = header.get_u8();
    let _reserved = header.get_u8();
    let item_count = header.get_u16_le();

    if chrom_id != tid {
        return Ok(Vec::new());
    }

    let mut records = &data[24..];
    let mut values: Vec<Value> = Vec::with_capacity(item_count as usize);
    let mut curr_start = section_start;

    for _ in 0..item_count {
        let value = match section_type {
            1 => {
                // bedgraph
                if records.remaining() < 12 {
                    break;
                }
                let chrom_start = records.get_u32_le();
                let chrom_end = records.get_u32_le();
                let value = records.get_f32_le();
                Value {
                    start: chrom_start,
                    end: chrom_end,
                    value,
                }
            }
            2 => {
                // variable step
                if records.remaining() < 8 {
                    break;
                }
                let chrom_start = records.get_u32_le();
                let value = records.get_f32_le();
                Value {
                    start: chrom_start,
                    end: chrom_start + item_span,
                    value,
                }
            }
            3 => {
                // fixed step
                if records.remaining() < 4 {
                    break;
                }
                curr_start += item_step;
                let value = records.get_f32_le();
                Value {
                    start: curr_start,
                    end: curr_start + item_span,
                    value,
                }
            }
            t => {
                return Err(BigWigReadError::UnknownSectionType(t));
            }
        };
        if value.end > start && value.start < end {
            values.push(value);
        }
    }

    Ok(values)
}

struct IntervalIter<'a, R> {
    bigwig: &'a mut BigWigRead<R>,
    blocks: std::vec::IntoIter<Block>,
    vals: std::vec::IntoIter<Value>,
    tid: u32,
    start: u32,
    end: u32,
}

impl<'a, R: SeekableRead> Iterator for IntervalIter<'a, R> {
    type Item = Result<Value, BigWigReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(v) = self.vals.next() {
                return Some(Ok(v));
            }
            let current_block = self.blocks.next()?;
            match get_block_values(self.bigwig, &current_block, self.tid, self.start, self.end) {
                Ok(vals) => self.vals = vals.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Batched interval iteration: each `next` decodes up to
/// `blocks_per_iteration` data blocks and yields their intervals
/// together, bounding how much block data is resident at once.
pub struct IntervalBatchIter<'a, R> {
    bigwig: &'a mut BigWigRead<R>,
    blocks: Vec<Block>,
    offset: usize,
    blocks_per_iteration: usize,
    failed: bool,
    tid: u32,
    start: u32,
    end: u32,
}

impl<'a, R: SeekableRead> Iterator for IntervalBatchIter<'a, R> {
    type Item = Result<Vec<Value>, BigWigReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.blocks.len() {
            return None;
        }
        let batch_end = (self.offset + self.blocks_per_iteration).min(self.blocks.len());
        let mut values = Vec::new();
        for i in self.offset..batch_end {
            let block = self.blocks[i];
            match get_block_values(self.bigwig, &block, self.tid, self.start, self.end) {
                Ok(mut vals) => values.append(&mut vals),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
        self.offset = batch_end;
        Some(Ok(values))
    }
}
