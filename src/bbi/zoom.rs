use bytes::Buf;
use thiserror::Error;

use crate::bbi::bbiread::{read_block_data, BigWigReadError};
use crate::bbi::bigwigread::{get_block_values, BigWigRead};
use crate::bbi::cirtree::{read_index, search_index};
use crate::bbi::{Value, ZoomHeader, ZoomRecord};
use crate::utils::file::reopen::SeekableRead;

/// How a requested reduction level is matched against the levels a file
/// actually has.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ZoomSelection {
    /// The largest reduction level at or below the requested one. With
    /// no level at or below, no level is selected and queries fall back
    /// to the raw data.
    BestUnder,
    /// The level closest to the requested one, in either direction.
    Closest,
}

/// Aggregation applied when rebinning summary data into output bins.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SummaryType {
    Mean,
    Min,
    Max,
    Sum,
    /// Fraction of each bin covered by data, scaled so that a fully
    /// covered bin is `1.0`.
    Coverage,
}

/// Potential errors found when trying to read data from a zoom level
#[derive(Error, Debug)]
pub enum ZoomQueryError {
    #[error("the passed reduction level was not found")]
    ReductionLevelNotFound,
    #[error(transparent)]
    ReadError(#[from] BigWigReadError),
}

pub(crate) fn select_zoom_level(
    zoom_headers: &[ZoomHeader],
    desired: u32,
    selection: ZoomSelection,
) -> Option<usize> {
    match selection {
        ZoomSelection::BestUnder => {
            if desired <= 1 {
                return None;
            }
            zoom_headers
                .iter()
                .enumerate()
                .filter(|(_, z)| z.reduction_level <= desired)
                .min_by_key(|(_, z)| desired - z.reduction_level)
                .map(|(i, _)| i)
        }
        ZoomSelection::Closest => zoom_headers
            .iter()
            .enumerate()
            .min_by_key(|(_, z)| z.reduction_level.abs_diff(desired))
            .map(|(i, _)| i),
    }
}

/// Parses a zoom data block (a packed array of 32-byte summary records)
/// into `records`, keeping the records overlapping `tid:start-end`.
pub(crate) fn parse_summary_block(
    data: &[u8],
    tid: u32,
    start: u32,
    end: u32,
    records: &mut Vec<ZoomRecord>,
) {
    let mut bytes = data;
    while bytes.remaining() >= 32 {
        let chrom = bytes.get_u32_le();
        let record_start = bytes.get_u32_le();
        let record_end = bytes.get_u32_le();
        let valid_count = bytes.get_u32_le();
        let min_val = bytes.get_f32_le();
        let max_val = bytes.get_f32_le();
        let sum_data = bytes.get_f32_le();
        let sum_squares = bytes.get_f32_le();
        if chrom == tid && record_start < end && record_end > start {
            records.push(ZoomRecord {
                chrom,
                start: record_start,
                end: record_end,
                valid_count,
                min_val,
                max_val,
                sum_data,
                sum_squares,
            });
        }
    }
}

impl<R: SeekableRead> BigWigRead<R> {
    /// The summary records of one zoom level overlapping `tid:start-end`,
    /// loading the level's index on first use.
    fn zoom_summaries(
        &mut self,
        zoom_idx: usize,
        tid: u32,
        start: u32,
        end: u32,
    ) -> Result<Vec<ZoomRecord>, BigWigReadError> {
        let uncompress_buf_size = self.info.header.uncompress_buf_size as usize;
        let BigWigRead { read, info, .. } = self;
        let zoom = match info.zoom_headers.get_mut(zoom_idx) {
            Some(zoom) => zoom,
            None => {
                return Err(BigWigReadError::CorruptIndex(format!(
                    "no zoom level {}",
                    zoom_idx
                )))
            }
        };

        let index_offset = zoom.index_offset;
        if zoom.index.is_none() {
            zoom.index = Some(read_index(read, index_offset)?);
        }
        let index = zoom.index.as_mut().unwrap();

        let blocks = search_index(read, index, tid, start, end)?;
        let mut records = Vec::new();
        for block in blocks {
            let data = read_block_data(read, uncompress_buf_size, &block)?;
            parse_summary_block(&data, tid, start, end, &mut records);
        }
        Ok(records)
    }

    /// Returns the summary records of the zoom level with the given
    /// reduction level that overlap `chrom:start-end`.
    pub fn get_zoom_interval(
        &mut self,
        chrom_name: &str,
        start: u32,
        end: u32,
        reduction_level: u32,
    ) -> Result<Vec<ZoomRecord>, ZoomQueryError> {
        let tid = self.info.chrom_id(chrom_name)?;
        let zoom_idx = self
            .info
            .zoom_headers
            .iter()
            .position(|z| z.reduction_level == reduction_level)
            .ok_or(ZoomQueryError::ReductionLevelNotFound)?;
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(self.zoom_summaries(zoom_idx, tid, start, end)?)
    }

    /// Aggregates `chrom:start-end` into `num_bins` values.
    ///
    /// A zoom level is selected for the desired reduction (by default
    /// `max(2, (end - start) / num_bins)`) and its summary records are
    /// rebinned with fractional-overlap weighting. When the file has no
    /// zoom levels, or `selection` picks none, bins are computed from
    /// the raw intervals instead.
    ///
    /// Bins that no data covers are `f32::NAN`.
    pub fn zoom_values(
        &mut self,
        chrom_name: &str,
        start: u32,
        end: u32,
        num_bins: usize,
        summary_type: SummaryType,
        selection: ZoomSelection,
        desired_reduction: Option<u32>,
    ) -> Result<Vec<f32>, BigWigReadError> {
        let tid = self.info.chrom_id(chrom_name)?;
        if num_bins == 0 || start >= end {
            return Ok(Vec::new());
        }

        let desired =
            desired_reduction.unwrap_or_else(|| ((end - start) / num_bins as u32).max(2));

        match select_zoom_level(&self.info.zoom_headers, desired, selection) {
            Some(zoom_idx) => {
                let summaries = self.zoom_summaries(zoom_idx, tid, start, end)?;
                Ok(rebin_summaries(&summaries, start, end, num_bins, summary_type))
            }
            None => {
                let blocks = self.overlapping_blocks(tid, start, end)?;
                let mut intervals = Vec::new();
                for block in blocks {
                    intervals.extend(get_block_values(self, &block, tid, start, end)?);
                }
                Ok(rebin_intervals(&intervals, start, end, num_bins, summary_type))
            }
        }
    }
}

struct BinStats {
    valid_count: u64,
    sum_data: f64,
    min_val: f64,
    max_val: f64,
}

impl BinStats {
    fn new() -> Self {
        BinStats {
            valid_count: 0,
            sum_data: 0.0,
            min_val: f64::INFINITY,
            max_val: f64::NEG_INFINITY,
        }
    }

    fn finish(&self, summary_type: SummaryType, num_bins: usize, span: u64) -> f32 {
        match summary_type {
            SummaryType::Mean => (self.sum_data / self.valid_count as f64) as f32,
            SummaryType::Max => self.max_val as f32,
            SummaryType::Min => self.min_val as f32,
            SummaryType::Sum => self.sum_data as f32,
            SummaryType::Coverage => {
                (self.valid_count as f64 * num_bins as f64 / span as f64) as f32
            }
        }
    }
}

/// Rebins summary records into `num_bins` values over `start-end`,
/// weighting counts and sums by each record's fractional overlap with
/// the bin. Minima and maxima are exact over any covering record, not
/// weighted.
fn rebin_summaries(
    summaries: &[ZoomRecord],
    start: u32,
    end: u32,
    num_bins: usize,
    summary_type: SummaryType,
) -> Vec<f32> {
    let span = (end - start) as u64;
    let mut values = vec![f32::NAN; num_bins];
    for (i, value) in values.iter_mut().enumerate() {
        let bin_start = start + (i as u64 * span / num_bins as u64) as u32;
        let bin_end = start + ((i as u64 + 1) * span / num_bins as u64) as u32;

        let mut stats = BinStats::new();
        for record in summaries {
            if record.end <= bin_start || record.start >= bin_end {
                continue;
            }
            let overlap = record
                .end
                .min(bin_end)
                .saturating_sub(record.start.max(bin_start));
            if overlap == 0 {
                continue;
            }
            let fraction = overlap as f64 / (record.end - record.start) as f64;
            // The truncation loses a small fraction of coverage at bin
            // boundaries; the reference reader floors here as well.
            stats.valid_count += (record.valid_count as f64 * fraction) as u64;
            stats.sum_data += record.sum_data as f64 * fraction;
            stats.min_val = stats.min_val.min(record.min_val as f64);
            stats.max_val = stats.max_val.max(record.max_val as f64);
        }

        if stats.valid_count > 0 {
            *value = stats.finish(summary_type, num_bins, span);
        }
    }
    values
}

/// Rebins raw intervals, treating every interval as a summary record
/// covering `overlap` bases with value `value`.
fn rebin_intervals(
    intervals: &[Value],
    start: u32,
    end: u32,
    num_bins: usize,
    summary_type: SummaryType,
) -> Vec<f32> {
    let span = (end - start) as u64;
    let mut values = vec![f32::NAN; num_bins];
    for (i, value) in values.iter_mut().enumerate() {
        let bin_start = start + (i as u64 * span / num_bins as u64) as u32;
        let bin_end = start + ((i as u64 + 1) * span / num_bins as u64) as u32;

        let mut stats = BinStats::new();
        for interval in intervals {
            if interval.end <= bin_start || interval.start >= bin_end {
                continue;
            }
            let overlap = interval
                .end
                .min(bin_end)
                .saturating_sub(interval.start.max(bin_start));
            if overlap == 0 {
                continue;
            }
            stats.valid_count += overlap as u64;
            stats.sum_data += interval.value as f64 * overlap as f64;
            stats.min_val = stats.min_val.min(interval.value as f64);
            stats.max_val = stats.max_val.max(interval.value as f64);
        }

        if stats.valid_count > 0 {
            *value = stats.finish(summary_type, num_bins, span);
        }
    }
    values
}
