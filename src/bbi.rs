pub(crate) mod bbiread;
pub(crate) mod bigwigread;
pub(crate) mod cirtree;
pub(crate) mod zoom;

pub(crate) const BIGWIG_MAGIC: u32 = 0x888F_FC26;
pub(crate) const CHROM_TREE_MAGIC: u32 = 0x78CA_8C91;
pub(crate) const CIR_TREE_MAGIC: u32 = 0x2468_ACE0;

use crate::bbi::cirtree::RTreeIndex;

/// Info on a specific zoom level in a bigWig file.
///
/// Each level stores its data reduced to `reduction_level` bases per
/// summary record, behind its own R-tree index.
#[derive(Clone, Debug)]
pub struct ZoomHeader {
    pub reduction_level: u32,
    /// Offset of the level's data section. Not consulted when reading:
    /// record blocks are only reached through the level's index.
    pub data_offset: u64,
    pub(crate) index_offset: u64,
    pub(crate) index: Option<RTreeIndex>,
}

/// A single summary record from a zoom level, as laid out on disk.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ZoomRecord {
    pub chrom: u32,
    pub start: u32,
    pub end: u32,
    pub valid_count: u32,
    pub min_val: f32,
    pub max_val: f32,
    pub sum_data: f32,
    pub sum_squares: f32,
}

/// The file-wide summary, present in most bigWig files.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TotalSummary {
    pub bases_covered: u64,
    pub min_val: f64,
    pub max_val: f64,
    pub sum_data: f64,
    pub sum_squares: f64,
}

/// Represents a single value in a bigWig file
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Value {
    pub start: u32,
    pub end: u32,
    pub value: f32,
}

pub use bbiread::*;
pub use bigwigread::*;
pub use zoom::*;
