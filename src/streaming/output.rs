//! Output sinks for resolved fragments.
//!
//! Uses itoa for integer formatting to avoid allocation in the hot path.

use std::io::{self, BufWriter, Write};

use crossbeam_channel::Sender;

use crate::error::{DedupError, Result};
use crate::fragment::{Fragment, FragmentStatus};
use crate::read::ReadFlags;
use crate::streaming::buffers::DEFAULT_OUTPUT_BUFFER;

/// Column names written by [`FragmentWriter::write_header`].
pub const HEADER_LINE: &[u8] = b"#read_name\tflag\tchrom\tstart\tstatus\tduplicate_count\tcoordinate_key\n";

/// Receives batches of fragments with terminal status.
///
/// Batches arrive in no particular order.
pub trait FragmentSink {
    fn accept(&mut self, fragments: Vec<Fragment>) -> Result<()>;
}

impl FragmentSink for Vec<Fragment> {
    fn accept(&mut self, fragments: Vec<Fragment>) -> Result<()> {
        self.extend(fragments);
        Ok(())
    }
}

impl<S: FragmentSink + ?Sized> FragmentSink for &mut S {
    fn accept(&mut self, fragments: Vec<Fragment>) -> Result<()> {
        (**self).accept(fragments)
    }
}

/// Forwards batches to a writer thread.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<Vec<Fragment>>,
}

impl ChannelSink {
    pub fn new(sender: Sender<Vec<Fragment>>) -> Self {
        Self { sender }
    }
}

impl FragmentSink for ChannelSink {
    fn accept(&mut self, fragments: Vec<Fragment>) -> Result<()> {
        if fragments.is_empty() {
            return Ok(());
        }
        self.sender.send(fragments).map_err(|_| {
            DedupError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "output writer stopped",
            ))
        })
    }
}

/// Tab-separated per-read output writer.
///
/// One line per read: name, flag (0x400 set only for DUPLICATE fragments),
/// chromosome, start, status, duplicate count and coordinate key.
pub struct FragmentWriter<W: Write> {
    writer: BufWriter<W>,
    itoa_buf: itoa::Buffer,
}

impl<W: Write> FragmentWriter<W> {
    /// Create a new FragmentWriter with the default buffer.
    pub fn new(output: W) -> Self {
        Self::with_capacity(DEFAULT_OUTPUT_BUFFER, output)
    }

    /// Create a new FragmentWriter with specified buffer size.
    pub fn with_capacity(capacity: usize, output: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(capacity, output),
            itoa_buf: itoa::Buffer::new(),
        }
    }

    pub fn write_header(&mut self) -> Result<()> {
        self.writer.write_all(HEADER_LINE)?;
        Ok(())
    }

    #[inline]
    fn write_int<I: itoa::Integer>(&mut self, n: I) -> Result<()> {
        self.writer.write_all(self.itoa_buf.format(n).as_bytes())?;
        Ok(())
    }

    /// Write every read of one fragment.
    pub fn write_fragment(&mut self, fragment: &Fragment) -> Result<()> {
        let duplicate = fragment.status == FragmentStatus::Duplicate;
        for read in &fragment.reads {
            let flags = read.flags.with(ReadFlags::DUPLICATE, duplicate);

            self.writer.write_all(read.name.as_bytes())?;
            self.writer.write_all(b"\t")?;
            self.write_int(flags.bits())?;
            self.writer.write_all(b"\t")?;
            self.writer.write_all(read.chrom.as_bytes())?;
            self.writer.write_all(b"\t")?;
            self.write_int(read.start)?;
            self.writer.write_all(b"\t")?;
            self.writer.write_all(fragment.status.as_str().as_bytes())?;
            self.writer.write_all(b"\t")?;
            self.write_int(fragment.duplicate_count)?;
            self.writer.write_all(b"\t")?;
            self.writer.write_all(fragment.coordinates.key.as_bytes())?;
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Flush the output buffer.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| DedupError::Io(e.into_error()))
    }
}

impl<W: Write> FragmentSink for FragmentWriter<W> {
    fn accept(&mut self, fragments: Vec<Fragment>) -> Result<()> {
        for fragment in &fragments {
            self.write_fragment(fragment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::AlignedRead;

    fn fragment(status: FragmentStatus) -> Fragment {
        let read = AlignedRead::mapped("r1", "chr1", 0, 100, "10M")
            .unwrap()
            .with_flags(ReadFlags(ReadFlags::DUPLICATE));
        let mut fragment = Fragment::new(read).with_status(status);
        fragment.duplicate_count = 2;
        fragment
    }

    #[test]
    fn test_write_fragment_lines() {
        let mut writer = FragmentWriter::new(Vec::new());
        writer.write_header().unwrap();
        writer
            .accept(vec![
                fragment(FragmentStatus::Duplicate),
                fragment(FragmentStatus::Primary),
            ])
            .unwrap();
        let output = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('#'));
        assert_eq!(lines[1], "r1\t1024\tchr1\t100\tDUPLICATE\t2\tchr1:100+");
        // stale duplicate bit cleared
        assert_eq!(lines[2], "r1\t0\tchr1\t100\tPRIMARY\t2\tchr1:100+");
    }

    #[test]
    fn test_vec_and_channel_sinks() {
        let mut collected: Vec<Fragment> = Vec::new();
        collected.accept(vec![fragment(FragmentStatus::None)]).unwrap();
        assert_eq!(collected.len(), 1);

        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut sink = ChannelSink::new(tx);
        sink.accept(vec![fragment(FragmentStatus::None)]).unwrap();
        sink.accept(Vec::new()).unwrap();
        assert_eq!(rx.recv().unwrap().len(), 1);

        drop(rx);
        assert!(sink.accept(vec![fragment(FragmentStatus::None)]).is_err());
    }
}
