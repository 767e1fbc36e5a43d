//! # Synchronized Output Sink
//!
//! Workers compress their buffered output into independent BGZF members
//! and append them to a shared file under a mutex, so each flush is
//! atomic and output lines from one input block stay consecutive.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use noodles::bgzf;

use crate::error::{IbdEndsError, Result};

/// A mutex-guarded output file accepting whole compressed chunks
pub struct SyncSink {
    inner: Mutex<BufWriter<File>>,
}

impl SyncSink {
    /// Create the output file, truncating any existing file
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Append one compressed chunk
    pub fn write_chunk(&self, chunk: &[u8]) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| IbdEndsError::algorithm("output sink poisoned by a failed worker"))?;
        guard.write_all(chunk)?;
        Ok(())
    }

    /// Flush buffered output to disk
    pub fn finish(&self) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| IbdEndsError::algorithm("output sink poisoned by a failed worker"))?;
        guard.flush()?;
        Ok(())
    }
}

/// Compress a buffer into a self-contained sequence of BGZF blocks
pub fn compress_chunk(data: &[u8]) -> Result<Vec<u8>> {
    let mut writer = bgzf::Writer::new(Vec::new());
    writer.write_all(data)?;
    Ok(writer.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_compress_round_trip() {
        let text = b"ID1\tHAP1\nA\t1\n";
        let chunk = compress_chunk(text).unwrap();
        let mut reader = bgzf::Reader::new(&chunk[..]);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, text);
    }

    #[test]
    fn test_concatenated_chunks_decode() {
        let mut stream = compress_chunk(b"first\n").unwrap();
        stream.extend(compress_chunk(b"second\n").unwrap());
        let mut reader = bgzf::Reader::new(&stream[..]);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"first\nsecond\n");
    }
}
