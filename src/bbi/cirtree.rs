use std::io::SeekFrom;

use bytes::{Buf, BytesMut};

use crate::bbi::bbiread::{BigWigReadError, Block};
use crate::bbi::CIR_TREE_MAGIC;
use crate::utils::file::reopen::SeekableRead;
use crate::utils::file::tell::Tell;

/// An on-disk R-tree index. Only the root offset survives the descriptor;
/// nodes are materialized on demand as queries descend into them.
#[derive(Clone, Debug)]
pub(crate) struct RTreeIndex {
    pub(crate) root_offset: u64,
    pub(crate) root: Option<RTreeNode>,
}

#[derive(Clone, Debug)]
pub(crate) struct RTreeNode {
    pub(crate) children: RTreeChildren,
}

#[derive(Clone, Debug)]
pub(crate) enum RTreeChildren {
    Leaves(Vec<LeafChild>),
    Branches(Vec<BranchChild>),
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct LeafChild {
    start_chrom_ix: u32,
    start_base: u32,
    end_chrom_ix: u32,
    end_base: u32,
    data_offset: u64,
    data_size: u64,
}

#[derive(Clone, Debug)]
pub(crate) struct BranchChild {
    start_chrom_ix: u32,
    start_base: u32,
    end_chrom_ix: u32,
    end_base: u32,
    node_offset: u64,
    child: Option<Box<RTreeNode>>,
}

/// Reads the index descriptor at `offset`. The root node is not read
/// here; it is loaded on the first search.
pub(crate) fn read_index<R: SeekableRead>(
    file: &mut R,
    offset: u64,
) -> Result<RTreeIndex, BigWigReadError> {
    file.seek(SeekFrom::Start(offset))?;

    let mut header_data = BytesMut::zeroed(48);
    file.read_exact(&mut header_data)?;

    let magic = header_data.get_u32_le();
    if magic != CIR_TREE_MAGIC {
        return Err(BigWigReadError::BadMagic {
            kind: "index",
            expected: CIR_TREE_MAGIC,
            found: magic,
        });
    }

    let block_size = header_data.get_u32_le();
    let _item_count = header_data.get_u64_le();
    let _start_chrom_ix = header_data.get_u32_le();
    let _start_base = header_data.get_u32_le();
    let _end_chrom_ix = header_data.get_u32_le();
    let _end_base = header_data.get_u32_le();
    let _end_file_offset = header_data.get_u64_le();
    let _items_per_slot = header_data.get_u32_le();
    let _reserved = header_data.get_u32_le();

    if block_size == 0 {
        return Err(BigWigReadError::CorruptIndex(
            "zero block size in index descriptor".to_owned(),
        ));
    }

    Ok(RTreeIndex {
        root_offset: file.tell()?,
        root: None,
    })
}

pub(crate) fn read_node<R: SeekableRead>(
    file: &mut R,
    offset: u64,
) -> Result<RTreeNode, BigWigReadError> {
    file.seek(SeekFrom::Start(offset))?;

    let mut node_header = BytesMut::zeroed(4);
    file.read_exact(&mut node_header)?;

    let is_leaf = node_header.get_u8();
    let _reserved = node_header.get_u8();
    let count = node_header.get_u16_le() as usize;

    let children = match is_leaf {
        1 => {
            let mut bytes = BytesMut::zeroed(count * 32);
            file.read_exact(&mut bytes)?;
            let mut leaves = Vec::with_capacity(count);
            for _ in 0..count {
                leaves.push(LeafChild {
                    start_chrom_ix: bytes.get_u32_le(),
                    start_base: bytes.get_u32_le(),
                    end_chrom_ix: bytes.get_u32_le(),
                    end_base: bytes.get_u32_le(),
                    data_offset: bytes.get_u64_le(),
                    data_size: bytes.get_u64_le(),
                });
            }
            RTreeChildren::Leaves(leaves)
        }
        0 => {
            let mut bytes = BytesMut::zeroed(count * 24);
            file.read_exact(&mut bytes)?;
            let mut branches = Vec::with_capacity(count);
            for _ in 0..count {
                branches.push(BranchChild {
                    start_chrom_ix: bytes.get_u32_le(),
                    start_base: bytes.get_u32_le(),
                    end_chrom_ix: bytes.get_u32_le(),
                    end_base: bytes.get_u32_le(),
                    node_offset: bytes.get_u64_le(),
                    child: None,
                });
            }
            RTreeChildren::Branches(branches)
        }
        n => {
            return Err(BigWigReadError::CorruptIndex(format!(
                "unexpected node type: {}",
                n
            )))
        }
    };

    Ok(RTreeNode { children })
}

/// Whether a child's bounding box overlaps the query. A child may span a
/// chromosome boundary; only the end that matches the query chromosome
/// constrains the base range.
fn child_overlaps(
    tid: u32,
    start: u32,
    end: u32,
    start_chrom_ix: u32,
    start_base: u32,
    end_chrom_ix: u32,
    end_base: u32,
) -> bool {
    if tid < start_chrom_ix || tid > end_chrom_ix {
        return false;
    }
    if start_chrom_ix == end_chrom_ix {
        start_base < end && end_base > start
    } else {
        (tid != start_chrom_ix || start_base < end) && (tid != end_chrom_ix || end_base > start)
    }
}

/// Searches the index for all blocks overlapping `tid:start-end`,
/// loading the root on first use. Blocks are returned in traversal
/// order. An empty result is not an error.
pub(crate) fn search_index<R: SeekableRead>(
    file: &mut R,
    index: &mut RTreeIndex,
    tid: u32,
    start: u32,
    end: u32,
) -> Result<Vec<Block>, BigWigReadError> {
    if index.root.is_none() {
        index.root = Some(read_node(file, index.root_offset)?);
    }
    let root = index.root.as_mut().unwrap();

    let mut blocks = Vec::new();
    search_overlapping_blocks(file, root, tid, start, end, &mut blocks)?;
    Ok(blocks)
}

fn search_overlapping_blocks<R: SeekableRead>(
    file: &mut R,
    node: &mut RTreeNode,
    tid: u32,
    start: u32,
    end: u32,
    blocks: &mut Vec<Block>,
) -> Result<(), BigWigReadError> {
    match &mut node.children {
        RTreeChildren::Leaves(leaves) => {
            for child in leaves.iter() {
                let overlaps = child_overlaps(
                    tid,
                    start,
                    end,
                    child.start_chrom_ix,
                    child.start_base,
                    child.end_chrom_ix,
                    child.end_base,
                );
                if overlaps {
                    blocks.push(Block {
                        offset: child.data_offset,
                        size: child.data_size,
                    });
                }
            }
        }
        RTreeChildren::Branches(branches) => {
            for child in branches.iter_mut() {
                let overlaps = child_overlaps(
                    tid,
                    start,
                    end,
                    child.start_chrom_ix,
                    child.start_base,
                    child.end_chrom_ix,
                    child.end_base,
                );
                if !overlaps {
                    continue;
                }
                if child.child.is_none() {
                    child.child = Some(Box::new(read_node(file, child.node_offset)?));
                }
                let node = child.child.as_mut().unwrap();
                search_overlapping_blocks(file, node, tid, start, end, blocks)?;
            }
        }
    }
    Ok(())
}
