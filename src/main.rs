//! markdups: duplicate marking for coordinate-sorted SAM files
//!
//! Usage: markdups <COMMAND> [OPTIONS]

use clap::{Parser, Subcommand};
use env_logger::{Builder, Env};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use markdups::commands::{verify_sorted, verify_sorted_reader, MarkDupsCommand};
use markdups::config::{DedupConfig, DEFAULT_BUFFER_SIZE, DEFAULT_PARTITION_SIZE};
use markdups::error::{DedupError, Result};
use markdups::genome::Genome;

#[derive(Parser)]
#[command(name = "markdups")]
#[command(version)]
#[command(about = "Mark duplicate fragments in coordinate-sorted SAM files", long_about = None)]
struct Cli {
    /// Number of threads to use (default: number of CPUs)
    #[arg(long, short = 't', global = true)]
    threads: Option<usize>,

    /// Log filter, e.g. "debug" or "markdups=trace" (default: info, or RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mark duplicate fragments and write one line per read
    Mark {
        /// Input SAM file (use - for stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Genome file (chrom<TAB>size) instead of the SAM @SQ header
        #[arg(short = 'g', long)]
        genome: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Bases per partition
        #[arg(long, default_value_t = DEFAULT_PARTITION_SIZE)]
        partition_size: u32,

        /// Positions held in the per-chromosome ring buffer
        #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
        buffer_size: usize,

        /// Do not write the column header line
        #[arg(long)]
        no_header: bool,

        /// Print run statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Check that a SAM file is coordinate sorted
    Verify {
        /// Input SAM file (use - for stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Genome file for reference order validation
        #[arg(short = 'g', long)]
        genome: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut logger = Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(level) = &cli.log_level {
        logger.parse_filters(level);
    }
    logger.init();

    let result = match cli.command {
        Commands::Mark {
            input,
            genome,
            output,
            partition_size,
            buffer_size,
            no_header,
            stats,
        } => {
            let config = DedupConfig::new()
                .with_partition_size(partition_size)
                .with_buffer_size(buffer_size)
                .with_threads(cli.threads)
                .with_header(!no_header);
            run_mark(input, genome, output, config, stats)
        }
        Commands::Verify { input, genome } => run_verify(input, genome),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_genome(path: Option<PathBuf>) -> Result<Option<Genome>> {
    path.map(|p| {
        Genome::from_file(&p).map_err(|e| {
            DedupError::InvalidFormat(format!("Failed to load genome file: {}", e))
        })
    })
    .transpose()
}

/// File input, or None for stdin (`-` or no `--input`).
fn file_input(input: Option<PathBuf>) -> Option<PathBuf> {
    input.filter(|p| p.to_string_lossy() != "-")
}

fn run_mark(
    input: Option<PathBuf>,
    genome: Option<PathBuf>,
    output: Option<PathBuf>,
    config: DedupConfig,
    stats: bool,
) -> Result<()> {
    let mut cmd = MarkDupsCommand::new().with_config(config);
    if let Some(g) = load_genome(genome)? {
        cmd = cmd.with_genome(g);
    }

    let writer: Box<dyn Write + Send> = match output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout()),
    };

    let result = match file_input(input) {
        Some(path) => cmd.run(&path, writer)?,
        None => cmd.run_stdin(writer)?,
    };

    if stats {
        eprintln!("{}", result);
    }
    Ok(())
}

fn run_verify(input: Option<PathBuf>, genome: Option<PathBuf>) -> Result<()> {
    let genome = load_genome(genome)?;

    let records = match file_input(input) {
        Some(path) => verify_sorted(path, genome.as_ref())?,
        None => {
            let stdin = io::stdin();
            verify_sorted_reader(stdin.lock(), genome.as_ref())?
        }
    };

    eprintln!("Input is sorted ({} records)", records);
    Ok(())
}
