//! Duplicate marking over a coordinate-sorted SAM stream.
//!
//! # Modes
//!
//! - `run_streaming`: one reader, chromosomes processed one after another
//!   (stdin or any `Read`).
//! - `run_parallel`: in-memory or memory-mapped input split into
//!   per-chromosome spans, one driver per chromosome on a Rayon pool, a
//!   single writer thread fed over a bounded channel.
//!
//! Both modes share one [`CrossPartitionStore`] per run and drain it after
//! every chromosome has finished.
//!
//! # Requirements
//!
//! Input MUST be coordinate sorted with each reference in one block.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::thread;

use log::info;
use memmap2::Mmap;

use crate::config::DedupConfig;
use crate::driver::{ChromosomeDriver, DedupStats};
use crate::error::{DedupError, Result};
use crate::fragment::{Fragment, FragmentStatus};
use crate::genome::Genome;
use crate::parallel::{index_chromosome_spans, process_chromosomes, ChromosomeSpan};
use crate::partition::CrossPartitionStore;
use crate::read::AlignedRead;
use crate::sam::{parse_record, SamReader};
use crate::streaming::buffers::DEFAULT_CHANNEL_CAPACITY;
use crate::streaming::{ChannelSink, FragmentSink, FragmentWriter};

/// Files at least this large are memory-mapped instead of read into memory.
const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Duplicate marking command configuration.
#[derive(Debug, Clone, Default)]
pub struct MarkDupsCommand {
    pub config: DedupConfig,
    /// Reference set; taken from the SAM header when None.
    pub genome: Option<Genome>,
}

impl MarkDupsCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the run configuration.
    pub fn with_config(mut self, config: DedupConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a fixed genome instead of the SAM header.
    pub fn with_genome(mut self, genome: Genome) -> Self {
        self.genome = Some(genome);
        self
    }

    /// Mark duplicates in a SAM file, in parallel by chromosome.
    pub fn run<P: AsRef<Path>, W: Write + Send>(&self, input_path: P, output: W) -> Result<DedupStats> {
        let file = File::open(input_path.as_ref())?;
        let file_size = file.metadata()?.len();

        if file_size >= MMAP_THRESHOLD {
            // SAFETY: the mapping is read-only and dropped before returning.
            let mmap = unsafe { Mmap::map(&file)? };
            self.run_parallel(&mmap, output)
        } else {
            let mut data = Vec::with_capacity(file_size as usize);
            (&file).read_to_end(&mut data)?;
            self.run_parallel(&data, output)
        }
    }

    /// Mark duplicates in SAM text from stdin.
    pub fn run_stdin<W: Write>(&self, output: W) -> Result<DedupStats> {
        let stdin = io::stdin();
        let reader = match &self.genome {
            Some(genome) => SamReader::with_genome(stdin.lock(), genome.clone()),
            None => SamReader::new(stdin.lock()),
        };

        let mut writer = FragmentWriter::new(output);
        if self.config.write_header {
            writer.write_header()?;
        }
        let stats = self.run_streaming(reader, &mut writer)?;
        writer.flush()?;
        Ok(stats)
    }

    /// Process one reader sequentially, a chromosome at a time.
    pub fn run_streaming<R: Read, S: FragmentSink>(
        &self,
        reader: SamReader<R>,
        sink: &mut S,
    ) -> Result<DedupStats> {
        self.config.validate()?;
        let store = CrossPartitionStore::new();
        let mut stats = DedupStats::default();
        let mut finished: HashSet<String> = HashSet::new();
        let mut records = reader.records().peekable();

        while let Some(result) = records.next() {
            let read = result?;
            if read.ref_index.is_none() {
                stats.reads += 1;
                write_unplaced(read, &mut stats, sink)?;
                continue;
            }
            if !finished.insert(read.chrom.clone()) {
                return Err(DedupError::InvalidFormat(format!(
                    "Input not sorted: reference '{}' was seen earlier",
                    read.chrom
                )));
            }

            let mut driver = ChromosomeDriver::new(read.chrom.clone(), &self.config, &store, &mut *sink);
            driver.process_read(read)?;
            loop {
                match records.peek() {
                    Some(Ok(next)) if next.chrom == driver.chromosome() && next.ref_index.is_some() => {}
                    _ => break,
                }
                if let Some(next) = records.next() {
                    driver.process_read(next?)?;
                }
            }
            let (chrom_stats, _) = driver.finish()?;
            stats += chrom_stats;
        }

        let leftovers = store.drain_all();
        stats.record(&leftovers);
        sink.accept(leftovers)?;

        info!("{}", stats);
        Ok(stats)
    }

    /// Process in-memory SAM text with one worker per chromosome.
    pub fn run_parallel<W: Write + Send>(&self, data: &[u8], output: W) -> Result<DedupStats> {
        self.config.validate()?;
        let (header_genome, spans) = index_chromosome_spans(data)?;
        let genome = self.genome.as_ref().unwrap_or(&header_genome);
        let store = CrossPartitionStore::new();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads.unwrap_or(0))
            .build()
            .map_err(|e| DedupError::Config(format!("Failed to build thread pool: {}", e)))?;
        info!(
            "Marking duplicates on {} chromosome blocks with {} threads",
            spans.len(),
            pool.current_num_threads()
        );

        let (tx, rx) = crossbeam_channel::bounded::<Vec<Fragment>>(DEFAULT_CHANNEL_CAPACITY);
        let write_header = self.config.write_header;

        thread::scope(|scope| {
            let writer = scope.spawn(move || -> Result<()> {
                let mut writer = FragmentWriter::new(output);
                if write_header {
                    writer.write_header()?;
                }
                for batch in rx {
                    writer.accept(batch)?;
                }
                writer.flush()
            });

            let results = pool.install(|| {
                process_chromosomes(&spans, |span| {
                    self.mark_span(data, span, genome, &store, ChannelSink::new(tx.clone()))
                })
            });

            let mut stats = DedupStats::default();
            let mut worker_error = None;
            for (chrom, result) in results {
                match result {
                    Ok(chrom_stats) => stats += chrom_stats,
                    Err(e) => {
                        if worker_error.is_none() {
                            worker_error = Some(DedupError::in_worker(chrom, e));
                        }
                    }
                }
            }

            let mut sink = ChannelSink::new(tx);
            let drained = match worker_error {
                None => {
                    let leftovers = store.drain_all();
                    stats.record(&leftovers);
                    sink.accept(leftovers)
                }
                Some(e) => Err(e),
            };
            drop(sink);

            let written = writer.join().unwrap_or_else(|_| {
                Err(DedupError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "output writer panicked",
                )))
            });

            // A writer failure explains any send error seen by the workers.
            written?;
            drained?;
            info!("{}", stats);
            Ok(stats)
        })
    }

    /// Run one chromosome span through its own driver.
    fn mark_span<S: FragmentSink>(
        &self,
        data: &[u8],
        span: &ChromosomeSpan,
        genome: &Genome,
        store: &CrossPartitionStore,
        mut sink: S,
    ) -> Result<DedupStats> {
        if genome.index_of(&span.chrom).is_none() {
            let mut stats = DedupStats::default();
            for (line_number, line) in span.lines(data) {
                if let Some(read) = parse_record(line, genome, line_number)? {
                    stats.reads += 1;
                    write_unplaced(read, &mut stats, &mut sink)?;
                }
            }
            return Ok(stats);
        }

        let mut driver = ChromosomeDriver::new(span.chrom.clone(), &self.config, store, sink);
        for (line_number, line) in span.lines(data) {
            if let Some(read) = parse_record(line, genome, line_number)? {
                driver.process_read(read)?;
            }
        }
        let (stats, _) = driver.finish()?;
        Ok(stats)
    }
}

/// Reads with no usable reference are written as NONE.
fn write_unplaced<S: FragmentSink + ?Sized>(
    read: AlignedRead,
    stats: &mut DedupStats,
    sink: &mut S,
) -> Result<()> {
    let fragments = vec![Fragment::new(read).with_status(FragmentStatus::None)];
    stats.unplaced += 1;
    stats.record(&fragments);
    sink.accept(fragments)
}
