/*!
`bwread` reads bigWig files: per-base quantitative signal over a
reference genome, stored binary, indexed, and block-compressed. Files
can be opened from a local path or an HTTP(S) URL; remote files are read
with ranged requests, so extracting a small genomic interval never
downloads the whole file.

The file format specification for bigWig files is defined in this
paper: <https://doi.org/10.1093/bioinformatics/btq351>

## Opening

The entrypoint is [`BigWigRead::open`], which takes any type that
implements both [`Read`][std::io::Read] and [`Seek`][std::io::Seek].
[`BigWigRead::open_file`] opens a local path, and
[`BigWigRead::open_uri`] dispatches on the URI scheme, selecting the
buffered remote reader for `http://` and `https://`.

## Reading

Once opened, the header, zoom levels, chromosomes, and file-wide summary
are available through [`BigWigRead::info`]. The main data is read with
[`BigWigRead::get_interval`], which returns an `Iterator` of [`Value`]s
overlapping the provided region, or with
[`BigWigRead::get_interval_batches`], which bounds memory by decoding a
fixed number of data blocks per step. [`BigWigRead::values`] expands
intervals to per-base values.

For genome-browser style rendering, [`BigWigRead::zoom_values`]
aggregates a region into a fixed number of bins from the most
appropriate precomputed zoom level (falling back to the raw data when
none fits), with [`SummaryType`] selecting the statistic.

```no_run
use bwread::BigWigRead;

# fn main() -> Result<(), Box<dyn std::error::Error>> {
let mut bw = BigWigRead::open_file("example.bigWig")?;
for interval in bw.get_interval("chr1", 100_000, 200_000)? {
    let interval = interval?;
    println!("{}-{}: {}", interval.start, interval.end, interval.value);
}
# Ok(())
# }
```
*/

mod bbi;
pub mod utils;

pub use bbi::*;
