//! End-to-end duplicate marking on small SAM texts.
//!
//! Each case runs through `MarkDupsCommand` and checks the per-read status
//! and duplicate count.

#![allow(clippy::too_many_arguments)]

use std::collections::HashMap;

use markdups::commands::MarkDupsCommand;
use markdups::config::DedupConfig;
use markdups::driver::DedupStats;
use markdups::fragment::{Fragment, FragmentStatus};
use markdups::sam::SamReader;

const HEADER: &str = "@HD\tVN:1.6\tSO:coordinate\n\
                      @SQ\tSN:chr1\tLN:100000\n\
                      @SQ\tSN:chr2\tLN:100000\n";

const HIGH: &str = "IIIIIIIIII"; // phred 40
const LOW: &str = "5555555555"; // phred 20

/// One SAM record line.
fn rec(name: &str, flag: u16, chrom: &str, pos: u32, cigar: &str, mate: (&str, u32), qual: &str, tags: &str) -> String {
    let mut line = format!(
        "{}\t{}\t{}\t{}\t60\t{}\t{}\t{}\t0\t*\t{}",
        name, flag, chrom, pos, cigar, mate.0, mate.1, qual
    );
    if !tags.is_empty() {
        line.push('\t');
        line.push_str(tags);
    }
    line.push('\n');
    line
}

fn sam(records: &[String]) -> String {
    let mut text = HEADER.to_string();
    for r in records {
        text.push_str(r);
    }
    text
}

fn config() -> DedupConfig {
    DedupConfig::new()
        .with_partition_size(1_000)
        .with_buffer_size(1_000)
        .with_threads(Some(2))
}

type Calls = HashMap<(String, u32), (FragmentStatus, u32)>;

fn mark_with(text: &str, config: DedupConfig) -> (DedupStats, Calls) {
    let cmd = MarkDupsCommand::new().with_config(config);
    let mut out: Vec<Fragment> = Vec::new();
    let stats = cmd
        .run_streaming(SamReader::new(text.as_bytes()), &mut out)
        .unwrap();

    let mut calls = HashMap::new();
    for fragment in &out {
        for read in &fragment.reads {
            calls.insert(
                (read.name.clone(), read.start),
                (fragment.status, fragment.duplicate_count),
            );
        }
    }
    (stats, calls)
}

fn mark(text: &str) -> (DedupStats, Calls) {
    mark_with(text, config())
}

fn call(calls: &Calls, name: &str, start: u32) -> (FragmentStatus, u32) {
    *calls
        .get(&(name.to_string(), start))
        .unwrap_or_else(|| panic!("no output for {}:{}", name, start))
}

fn sorted_lines(output: &[u8]) -> Vec<String> {
    let text = String::from_utf8(output.to_vec()).unwrap();
    let mut lines: Vec<String> = text
        .lines()
        .filter(|l| !l.starts_with('#'))
        .map(str::to_string)
        .collect();
    lines.sort();
    lines
}

/// Forward read at `pos` with a reverse mate at `mate_pos`, both 10M.
fn pair(name: &str, pos: u32, mate_pos: u32, qual: &str) -> [String; 2] {
    [
        rec(name, 99, "chr1", pos, "10M", ("=", mate_pos), qual, "MC:Z:10M"),
        rec(name, 147, "chr1", mate_pos, "10M", ("=", pos), qual, "MC:Z:10M"),
    ]
}

#[test]
fn test_duplicate_pair_marked_by_quality() {
    let [a1, a2] = pair("a", 100, 300, LOW);
    let [b1, b2] = pair("b", 100, 300, HIGH);
    let (stats, calls) = mark(&sam(&[a1, b1, a2, b2]));

    assert_eq!(call(&calls, "a", 100), (FragmentStatus::Duplicate, 2));
    assert_eq!(call(&calls, "a", 300), (FragmentStatus::Duplicate, 2));
    assert_eq!(call(&calls, "b", 100), (FragmentStatus::Primary, 2));
    assert_eq!(call(&calls, "b", 300), (FragmentStatus::Primary, 2));
    assert_eq!(stats.reads_written, 4);
    assert_eq!(stats.fragments, 2);
    assert_eq!(stats.duplicates, 1);
}

#[test]
fn test_equal_quality_keeps_first_seen() {
    let [a1, a2] = pair("a", 100, 300, HIGH);
    let [b1, b2] = pair("b", 100, 300, HIGH);
    let (_, calls) = mark(&sam(&[a1, b1, a2, b2]));

    assert_eq!(call(&calls, "a", 100).0, FragmentStatus::Primary);
    assert_eq!(call(&calls, "b", 300).0, FragmentStatus::Duplicate);
}

#[test]
fn test_different_mate_positions_are_not_duplicates() {
    let [a1, a2] = pair("a", 100, 300, HIGH);
    let [b1, b2] = pair("b", 100, 310, HIGH);
    let (stats, calls) = mark(&sam(&[a1, b1, a2, b2]));

    for (name, start) in [("a", 100), ("a", 300), ("b", 100), ("b", 310)] {
        assert_eq!(call(&calls, name, start), (FragmentStatus::None, 1));
    }
    assert_eq!(stats.duplicates, 0);
}

#[test]
fn test_reverse_reads_compared_by_unclipped_end() {
    // r1, r2 and r3 end at 109 once the soft clip is added back.
    let records = [
        rec("r2", 16, "chr1", 95, "15M", ("*", 0), "*", ""),
        rec("r1", 16, "chr1", 100, "10M", ("*", 0), "*", ""),
        rec("r3", 16, "chr1", 100, "8M2S", ("*", 0), "*", ""),
        rec("r4", 16, "chr1", 100, "9M", ("*", 0), "*", ""),
    ];
    let (_, calls) = mark(&sam(&records));

    assert_eq!(call(&calls, "r2", 95), (FragmentStatus::Primary, 3));
    assert_eq!(call(&calls, "r1", 100).0, FragmentStatus::Duplicate);
    assert_eq!(call(&calls, "r3", 100).0, FragmentStatus::Duplicate);
    assert_eq!(call(&calls, "r4", 100), (FragmentStatus::None, 1));
}

#[test]
fn test_unpairable_mate_written_as_none() {
    let records = [
        rec("u", 65, "chr1", 100, "10M", ("chrUn", 50), HIGH, "MC:Z:10M"),
        rec("s", 0, "chr1", 200, "10M", ("*", 0), HIGH, ""),
    ];
    let (stats, calls) = mark(&sam(&records));

    assert_eq!(call(&calls, "u", 100), (FragmentStatus::None, 1));
    assert_eq!(stats.unpairable, 1);
    assert_eq!(stats.reads_written, 2);
}

#[test]
fn test_unmapped_mate_travels_with_fragment() {
    let records = [
        rec("a", 73, "chr1", 100, "10M", ("=", 100), HIGH, ""),
        rec("a", 133, "chr1", 100, "*", ("=", 100), "*", ""),
        rec("b", 73, "chr1", 100, "10M", ("=", 100), LOW, ""),
        rec("b", 133, "chr1", 100, "*", ("=", 100), "*", ""),
    ];
    let (stats, _) = mark(&sam(&records));

    assert_eq!(stats.reads_written, 4);
    assert_eq!(stats.fragments, 2);
    assert_eq!(stats.primaries, 1);
    assert_eq!(stats.duplicates, 1);
}

#[test]
fn test_pair_spanning_partitions_gets_one_verdict() {
    let [a1, a2] = pair("a", 900, 1_500, HIGH);
    let [b1, b2] = pair("b", 900, 1_500, LOW);
    let (stats, calls) = mark(&sam(&[a1, b1, a2, b2]));

    assert_eq!(call(&calls, "a", 900), (FragmentStatus::Primary, 2));
    assert_eq!(call(&calls, "a", 1_500), (FragmentStatus::Primary, 2));
    assert_eq!(call(&calls, "b", 900), (FragmentStatus::Duplicate, 2));
    assert_eq!(call(&calls, "b", 1_500), (FragmentStatus::Duplicate, 2));
    assert_eq!(stats.partitions, 2);
}

#[test]
fn test_supplementary_inherits_primary_verdict() {
    let records = [
        rec("a", 0, "chr1", 100, "10M", ("*", 0), HIGH, "SA:Z:chr1,5000,+,10S10M,60,0;"),
        rec("b", 0, "chr1", 100, "10M", ("*", 0), LOW, "SA:Z:chr1,5000,+,10S10M,60,0;"),
        rec("a", 2048, "chr1", 5_000, "10S10M", ("*", 0), HIGH, "SA:Z:chr1,100,+,10M10S,60,0;"),
        rec("b", 2048, "chr1", 5_000, "10S10M", ("*", 0), LOW, "SA:Z:chr1,100,+,10M10S,60,0;"),
    ];
    let config = DedupConfig::new()
        .with_partition_size(100_000)
        .with_buffer_size(1_000);
    let (stats, calls) = mark_with(&sam(&records), config);

    assert_eq!(call(&calls, "a", 5_000), (FragmentStatus::Primary, 2));
    assert_eq!(call(&calls, "b", 5_000), (FragmentStatus::Duplicate, 2));
    assert_eq!(call(&calls, "a", 100).0, FragmentStatus::Primary);
    assert_eq!(stats.reads_written, 4);
}

#[test]
fn test_out_of_order_read_is_dropped() {
    let records = [
        rec("r1", 0, "chr1", 1_000, "10M", ("*", 0), HIGH, ""),
        rec("r2", 0, "chr1", 100, "10M", ("*", 0), HIGH, ""),
    ];
    let config = DedupConfig::new()
        .with_partition_size(100_000)
        .with_buffer_size(10);
    let (stats, calls) = mark_with(&sam(&records), config);

    assert_eq!(stats.out_of_order, 1);
    assert_eq!(stats.reads, 2);
    assert_eq!(stats.reads_written, 1);
    assert!(!calls.contains_key(&("r2".to_string(), 100)));
}

#[test]
fn test_cross_chromosome_pair_parallel_matches_streaming() {
    let records = [
        rec("a", 97, "chr1", 100, "10M", ("chr2", 200), HIGH, "MC:Z:10M"),
        rec("b", 97, "chr1", 100, "10M", ("chr2", 200), LOW, "MC:Z:10M"),
        rec("c", 0, "chr1", 400, "10M", ("*", 0), HIGH, ""),
        rec("a", 145, "chr2", 200, "10M", ("chr1", 100), HIGH, "MC:Z:10M"),
        rec("b", 145, "chr2", 200, "10M", ("chr1", 100), LOW, "MC:Z:10M"),
        rec("u", 4, "*", 0, "*", ("*", 0), "*", ""),
    ];
    let text = sam(&records);

    let (stats, calls) = mark(&text);
    assert_eq!(call(&calls, "a", 100), (FragmentStatus::Primary, 2));
    assert_eq!(call(&calls, "a", 200), (FragmentStatus::Primary, 2));
    assert_eq!(call(&calls, "b", 100), (FragmentStatus::Duplicate, 2));
    assert_eq!(call(&calls, "b", 200), (FragmentStatus::Duplicate, 2));
    assert_eq!(stats.reads_written, 6);

    let cmd = MarkDupsCommand::new().with_config(config().with_header(false));
    let mut streamed = Vec::new();
    let mut writer = markdups::streaming::FragmentWriter::new(&mut streamed);
    cmd.run_streaming(SamReader::new(text.as_bytes()), &mut writer)
        .unwrap();
    writer.flush().unwrap();
    drop(writer);

    let mut parallel = Vec::new();
    let parallel_stats = cmd.run_parallel(text.as_bytes(), &mut parallel).unwrap();

    assert_eq!(sorted_lines(&streamed), sorted_lines(&parallel));
    assert_eq!(parallel_stats.reads_written, 6);
    assert!(sorted_lines(&parallel).contains(&"b\t1169\tchr2\t200\tDUPLICATE\t2\tchr1:100+_chr2:209-".to_string()));
}
