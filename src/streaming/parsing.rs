//! Zero-allocation SAM field parsing utilities.
//!
//! These functions split and parse SAM record lines straight from bytes
//! without building intermediate strings.

use memchr::{memchr, memchr_iter};

/// Fast u64 parsing - no allocation, no error formatting.
///
/// Returns None if the input is empty or contains non-digit characters.
#[inline(always)]
pub fn parse_u64_fast(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    let mut n: u64 = 0;
    for &b in bytes {
        let d = b.wrapping_sub(b'0');
        if d > 9 {
            return None;
        }
        n = n.wrapping_mul(10).wrapping_add(d as u64);
    }
    Some(n)
}

/// Strip a trailing `\n` or `\r\n`.
#[inline(always)]
pub fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Iterate over the tab-separated fields of a line using memchr.
#[inline]
pub fn split_fields(line: &[u8]) -> impl Iterator<Item = &[u8]> {
    let line = trim_line_end(line);
    let mut start = 0;
    memchr_iter(b'\t', line)
        .chain(std::iter::once(line.len()))
        .map(move |end| {
            let field = &line[start..end];
            start = end + 1;
            field
        })
}

/// Parse RNAME and POS of a SAM record.
///
/// Returns (chrom_bytes, pos) or None if the line has fewer than four fields.
#[inline(always)]
pub fn parse_sam_position_bytes(line: &[u8]) -> Option<(&[u8], u64)> {
    let tab1 = memchr(b'\t', line)?;
    let rest1 = &line[tab1 + 1..];
    let tab2 = memchr(b'\t', rest1)?;
    let rest2 = &rest1[tab2 + 1..];
    let tab3 = memchr(b'\t', rest2)?;
    let chrom = &rest2[..tab3];

    let rest3 = &rest2[tab3 + 1..];
    let pos_len = memchr(b'\t', rest3).unwrap_or(rest3.len());
    let pos = parse_u64_fast(trim_line_end(&rest3[..pos_len]))?;

    Some((chrom, pos))
}

/// Check if a line should be skipped (empty or header).
#[inline(always)]
pub fn should_skip_line(line: &[u8]) -> bool {
    let line = trim_line_end(line);
    line.is_empty() || line[0] == b'@'
}
