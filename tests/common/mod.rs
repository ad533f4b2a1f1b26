//! Builds complete bigWig byte images for tests: header, zoom headers,
//! chromosome tree, data section, R-tree index, zoom levels, and total
//! summary, laid out the way the reference writer does. Blocks are
//! optionally zlib-compressed; the chromosome tree and the R-trees can
//! be forced to grow internal nodes to exercise the recursive readers.

#![allow(dead_code)]

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

const BIGWIG_MAGIC: u32 = 0x888F_FC26;
const CHROM_TREE_MAGIC: u32 = 0x78CA_8C91;
const CIR_TREE_MAGIC: u32 = 0x2468_ACE0;

/// One data section, encoded as a single block.
pub struct Section {
    pub tid: u32,
    pub start: u32,
    pub end: u32,
    pub data: SectionData,
}

pub enum SectionData {
    /// `(start, end, value)` triples.
    BedGraph(Vec<(u32, u32, f32)>),
    /// `(start, value)` pairs, each spanning `span` bases.
    VarStep { span: u32, items: Vec<(u32, f32)> },
    /// Values at `start + step`, `start + 2*step`, …, each spanning
    /// `span` bases (the reference writer's pre-stepped layout).
    FixedStep { step: u32, span: u32, values: Vec<f32> },
}

/// One 32-byte zoom summary record.
#[derive(Copy, Clone)]
pub struct ZoomRec {
    pub chrom: u32,
    pub start: u32,
    pub end: u32,
    pub valid_count: u32,
    pub min_val: f32,
    pub max_val: f32,
    pub sum_data: f32,
    pub sum_squares: f32,
}

impl ZoomRec {
    /// A record of `count` covered bases, all with value `value`.
    pub fn flat(chrom: u32, start: u32, end: u32, count: u32, value: f32) -> ZoomRec {
        ZoomRec {
            chrom,
            start,
            end,
            valid_count: count,
            min_val: value,
            max_val: value,
            sum_data: value * count as f32,
            sum_squares: value * value * count as f32,
        }
    }
}

pub struct ZoomLevel {
    pub reduction_level: u32,
    pub records: Vec<ZoomRec>,
}

pub struct BigWigBuilder {
    pub chroms: Vec<(String, u32)>,
    pub sections: Vec<Section>,
    pub zooms: Vec<ZoomLevel>,
    pub compressed: bool,
    pub total_summary: Option<(u64, f64, f64, f64, f64)>,
    /// Index children per leaf node; fewer sections than this produce a
    /// single leaf root, more produce a two-level tree.
    pub index_leaf_fanout: usize,
    /// Chromosome-tree entries per leaf; more chromosomes than this
    /// produce an internal root node.
    pub chrom_leaf_fanout: usize,
}

impl BigWigBuilder {
    pub fn new() -> BigWigBuilder {
        BigWigBuilder {
            chroms: vec![("chr1".to_string(), 1_000_000)],
            sections: vec![],
            zooms: vec![],
            compressed: false,
            total_summary: None,
            index_leaf_fanout: 256,
            chrom_leaf_fanout: 256,
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let chrom_tree_offset = 64 + self.zooms.len() as u64 * 24;
        let chrom_tree =
            build_chrom_tree(&self.chroms, self.chrom_leaf_fanout, chrom_tree_offset);

        let mut raw_max = 0usize;
        let mut data_blocks = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            let raw = encode_section(section);
            raw_max = raw_max.max(raw.len());
            data_blocks.push(compress(&raw, self.compressed));
        }
        let mut zoom_blocks = Vec::with_capacity(self.zooms.len());
        for zoom in &self.zooms {
            let raw = encode_zoom_records(&zoom.records);
            raw_max = raw_max.max(raw.len());
            zoom_blocks.push(compress(&raw, self.compressed));
        }
        let uncompress_buf_size = if self.compressed { raw_max as u32 } else { 0 };

        let full_data_offset = chrom_tree_offset + chrom_tree.len() as u64;

        // The data section leads with the number of sections.
        let mut cursor = full_data_offset + 8;
        let mut block_locations = Vec::with_capacity(data_blocks.len());
        for block in &data_blocks {
            block_locations.push((cursor, block.len() as u64));
            cursor += block.len() as u64;
        }

        let full_index_offset = cursor;
        let bounds: Vec<(u32, u32, u32)> = self
            .sections
            .iter()
            .map(|s| (s.tid, s.start, s.end))
            .collect();
        let index = build_index(
            &bounds,
            &block_locations,
            full_index_offset,
            self.index_leaf_fanout,
        );
        cursor += index.len() as u64;

        let mut zoom_headers = Vec::with_capacity(self.zooms.len());
        let mut zoom_bytes: Vec<Vec<u8>> = Vec::with_capacity(self.zooms.len());
        for (zoom, block) in self.zooms.iter().zip(&zoom_blocks) {
            let mut bytes = Vec::new();
            let data_offset = cursor;
            bytes
                .write_u32::<LittleEndian>(zoom.records.len() as u32)
                .unwrap();
            let block_offset = cursor + 4;
            bytes.extend_from_slice(block);
            cursor += bytes.len() as u64;

            let index_offset = cursor;
            let zoom_bounds: Vec<(u32, u32, u32)> = zoom
                .records
                .iter()
                .map(|r| (r.chrom, r.start, r.end))
                .collect();
            let agg_bounds = if zoom_bounds.is_empty() {
                vec![]
            } else {
                // One block holds every record of the level.
                vec![(
                    zoom_bounds[0].0,
                    zoom_bounds[0].1,
                    zoom_bounds[zoom_bounds.len() - 1].2,
                )]
            };
            let zoom_index = build_index(
                &agg_bounds,
                &[(block_offset, block.len() as u64)][..agg_bounds.len()],
                index_offset,
                self.index_leaf_fanout,
            );
            bytes.extend_from_slice(&zoom_index);
            cursor += zoom_index.len() as u64;

            zoom_headers.push((zoom.reduction_level, data_offset, index_offset));
            zoom_bytes.push(bytes);
        }

        let total_summary_offset = if self.total_summary.is_some() {
            cursor
        } else {
            0
        };

        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(BIGWIG_MAGIC).unwrap();
        out.write_u16::<LittleEndian>(4).unwrap(); // version
        out.write_u16::<LittleEndian>(self.zooms.len() as u16).unwrap();
        out.write_u64::<LittleEndian>(chrom_tree_offset).unwrap();
        out.write_u64::<LittleEndian>(full_data_offset).unwrap();
        out.write_u64::<LittleEndian>(full_index_offset).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap(); // field count
        out.write_u16::<LittleEndian>(0).unwrap(); // defined field count
        out.write_u64::<LittleEndian>(0).unwrap(); // autoSql offset
        out.write_u64::<LittleEndian>(total_summary_offset).unwrap();
        out.write_u32::<LittleEndian>(uncompress_buf_size).unwrap();
        out.write_u64::<LittleEndian>(0).unwrap(); // extension offset
        assert_eq!(out.len(), 64);

        for (reduction_level, data_offset, index_offset) in zoom_headers {
            out.write_u32::<LittleEndian>(reduction_level).unwrap();
            out.write_u32::<LittleEndian>(0).unwrap(); // padding
            out.write_u64::<LittleEndian>(data_offset).unwrap();
            out.write_u64::<LittleEndian>(index_offset).unwrap();
        }

        out.extend_from_slice(&chrom_tree);
        assert_eq!(out.len() as u64, full_data_offset);

        out.write_u64::<LittleEndian>(self.sections.len() as u64)
            .unwrap();
        for block in &data_blocks {
            out.extend_from_slice(block);
        }
        assert_eq!(out.len() as u64, full_index_offset);
        out.extend_from_slice(&index);

        for bytes in &zoom_bytes {
            out.extend_from_slice(bytes);
        }

        if let Some((bases_covered, min_val, max_val, sum_data, sum_squares)) = self.total_summary {
            assert_eq!(out.len() as u64, total_summary_offset);
            out.write_u64::<LittleEndian>(bases_covered).unwrap();
            out.write_f64::<LittleEndian>(min_val).unwrap();
            out.write_f64::<LittleEndian>(max_val).unwrap();
            out.write_f64::<LittleEndian>(sum_data).unwrap();
            out.write_f64::<LittleEndian>(sum_squares).unwrap();
        }

        out
    }
}

fn encode_section(section: &Section) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(section.tid).unwrap();
    out.write_u32::<LittleEndian>(section.start).unwrap();
    out.write_u32::<LittleEndian>(section.end).unwrap();
    let (step, span, section_type, count) = match &section.data {
        SectionData::BedGraph(items) => (0, 0, 1u8, items.len() as u16),
        SectionData::VarStep { span, items } => (0, *span, 2u8, items.len() as u16),
        SectionData::FixedStep { step, span, values } => {
            (*step, *span, 3u8, values.len() as u16)
        }
    };
    out.write_u32::<LittleEndian>(step).unwrap();
    out.write_u32::<LittleEndian>(span).unwrap();
    out.write_u8(section_type).unwrap();
    out.write_u8(0).unwrap();
    out.write_u16::<LittleEndian>(count).unwrap();

    match &section.data {
        SectionData::BedGraph(items) => {
            for (start, end, value) in items {
                out.write_u32::<LittleEndian>(*start).unwrap();
                out.write_u32::<LittleEndian>(*end).unwrap();
                out.write_f32::<LittleEndian>(*value).unwrap();
            }
        }
        SectionData::VarStep { items, .. } => {
            for (start, value) in items {
                out.write_u32::<LittleEndian>(*start).unwrap();
                out.write_f32::<LittleEndian>(*value).unwrap();
            }
        }
        SectionData::FixedStep { values, .. } => {
            for value in values {
                out.write_f32::<LittleEndian>(*value).unwrap();
            }
        }
    }
    out
}

fn encode_zoom_records(records: &[ZoomRec]) -> Vec<u8> {
    let mut out = Vec::new();
    for r in records {
        out.write_u32::<LittleEndian>(r.chrom).unwrap();
        out.write_u32::<LittleEndian>(r.start).unwrap();
        out.write_u32::<LittleEndian>(r.end).unwrap();
        out.write_u32::<LittleEndian>(r.valid_count).unwrap();
        out.write_f32::<LittleEndian>(r.min_val).unwrap();
        out.write_f32::<LittleEndian>(r.max_val).unwrap();
        out.write_f32::<LittleEndian>(r.sum_data).unwrap();
        out.write_f32::<LittleEndian>(r.sum_squares).unwrap();
    }
    out
}

fn compress(raw: &[u8], compressed: bool) -> Vec<u8> {
    if !compressed {
        return raw.to_vec();
    }
    let mut compressor = libdeflater::Compressor::new(libdeflater::CompressionLvl::default());
    let mut out = vec![0u8; compressor.zlib_compress_bound(raw.len())];
    let n = compressor.zlib_compress(raw, &mut out).unwrap();
    out.truncate(n);
    out
}

fn build_chrom_tree(chroms: &[(String, u32)], leaf_fanout: usize, tree_offset: u64) -> Vec<u8> {
    let key_size = chroms
        .iter()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(4)
        .max(4) as u32;

    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(CHROM_TREE_MAGIC).unwrap();
    out.write_u32::<LittleEndian>(leaf_fanout as u32).unwrap();
    out.write_u32::<LittleEndian>(key_size).unwrap();
    out.write_u32::<LittleEndian>(8).unwrap(); // value size
    out.write_u64::<LittleEndian>(chroms.len() as u64).unwrap();
    out.write_u64::<LittleEndian>(0).unwrap(); // reserved

    let write_key = |out: &mut Vec<u8>, name: &str| {
        let mut key = name.as_bytes().to_vec();
        key.resize(key_size as usize, 0);
        out.write_all(&key).unwrap();
    };

    let write_leaf = |out: &mut Vec<u8>, group: &[(usize, &(String, u32))]| {
        out.write_u8(1).unwrap();
        out.write_u8(0).unwrap();
        out.write_u16::<LittleEndian>(group.len() as u16).unwrap();
        for (id, (name, length)) in group {
            write_key(out, name);
            out.write_u32::<LittleEndian>(*id as u32).unwrap();
            out.write_u32::<LittleEndian>(*length).unwrap();
        }
    };

    let entries: Vec<(usize, &(String, u32))> = chroms.iter().enumerate().collect();
    if entries.len() <= leaf_fanout {
        write_leaf(&mut out, &entries);
        return out;
    }

    // Internal root over leaf groups. Child offsets are absolute, so the
    // root is laid out first with the leaves following in order.
    let groups: Vec<&[(usize, &(String, u32))]> = entries.chunks(leaf_fanout).collect();
    let tree_start = tree_offset + out.len() as u64;
    let root_len = 4 + groups.len() as u64 * (key_size as u64 + 8);
    let leaf_len = |g: &[(usize, &(String, u32))]| 4 + g.len() as u64 * (key_size as u64 + 8);

    out.write_u8(0).unwrap();
    out.write_u8(0).unwrap();
    out.write_u16::<LittleEndian>(groups.len() as u16).unwrap();
    let mut child_offset = tree_start + root_len;
    for group in &groups {
        write_key(&mut out, &group[0].1 .0);
        out.write_u64::<LittleEndian>(child_offset).unwrap();
        child_offset += leaf_len(group);
    }
    for group in &groups {
        write_leaf(&mut out, group);
    }
    out
}

/// Writes an R-tree over `bounds`/`locations`, either as a single leaf
/// root or, past `leaf_fanout` children, a branch root over leaf nodes.
fn build_index(
    bounds: &[(u32, u32, u32)],
    locations: &[(u64, u64)],
    index_offset: u64,
    leaf_fanout: usize,
) -> Vec<u8> {
    assert_eq!(bounds.len(), locations.len());

    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(CIR_TREE_MAGIC).unwrap();
    out.write_u32::<LittleEndian>(256).unwrap(); // block size
    out.write_u64::<LittleEndian>(bounds.len() as u64).unwrap();
    let (start_chrom, start_base) = bounds.first().map(|b| (b.0, b.1)).unwrap_or((0, 0));
    let (end_chrom, end_base) = bounds.last().map(|b| (b.0, b.2)).unwrap_or((0, 0));
    out.write_u32::<LittleEndian>(start_chrom).unwrap();
    out.write_u32::<LittleEndian>(start_base).unwrap();
    out.write_u32::<LittleEndian>(end_chrom).unwrap();
    out.write_u32::<LittleEndian>(end_base).unwrap();
    out.write_u64::<LittleEndian>(0).unwrap(); // end file offset
    out.write_u32::<LittleEndian>(1).unwrap(); // items per slot
    out.write_u32::<LittleEndian>(0).unwrap(); // reserved
    assert_eq!(out.len(), 48);

    let write_leaf_node = |out: &mut Vec<u8>, items: &[((u32, u32, u32), (u64, u64))]| {
        out.write_u8(1).unwrap();
        out.write_u8(0).unwrap();
        out.write_u16::<LittleEndian>(items.len() as u16).unwrap();
        for ((tid, start, end), (offset, size)) in items {
            out.write_u32::<LittleEndian>(*tid).unwrap();
            out.write_u32::<LittleEndian>(*start).unwrap();
            out.write_u32::<LittleEndian>(*tid).unwrap();
            out.write_u32::<LittleEndian>(*end).unwrap();
            out.write_u64::<LittleEndian>(*offset).unwrap();
            out.write_u64::<LittleEndian>(*size).unwrap();
        }
    };

    let items: Vec<((u32, u32, u32), (u64, u64))> = bounds
        .iter()
        .copied()
        .zip(locations.iter().copied())
        .collect();

    if items.len() <= leaf_fanout {
        write_leaf_node(&mut out, &items);
        return out;
    }

    let groups: Vec<&[((u32, u32, u32), (u64, u64))]> = items.chunks(leaf_fanout).collect();
    let root_offset = index_offset + 48;
    let root_len = 4 + groups.len() as u64 * 24;
    let leaf_len = |g: &[((u32, u32, u32), (u64, u64))]| 4 + g.len() as u64 * 32;

    out.write_u8(0).unwrap();
    out.write_u8(0).unwrap();
    out.write_u16::<LittleEndian>(groups.len() as u16).unwrap();
    let mut child_offset = root_offset + root_len;
    for group in &groups {
        let ((first_tid, first_start, _), _) = group[0];
        let ((last_tid, _, last_end), _) = group[group.len() - 1];
        out.write_u32::<LittleEndian>(first_tid).unwrap();
        out.write_u32::<LittleEndian>(first_start).unwrap();
        out.write_u32::<LittleEndian>(last_tid).unwrap();
        out.write_u32::<LittleEndian>(last_end).unwrap();
        out.write_u64::<LittleEndian>(child_offset).unwrap();
        child_offset += leaf_len(group);
    }
    for group in &groups {
        write_leaf_node(&mut out, group);
    }
    out
}
