//! # Block Line Reader
//!
//! A single reader thread that batches input lines into fixed-size blocks
//! and hands them to worker threads through a bounded channel. Workers
//! process whole blocks, so the output lines for a block stay consecutive
//! in the output stream.

use std::io::BufRead;
use std::thread;

use crossbeam_channel::{bounded, Receiver};

use crate::error::Result;

/// Number of input lines per block
pub const BLOCK_SIZE: usize = 10_000;

/// Spawn the reader thread.
///
/// Lines are delivered without their terminators. The channel holds at
/// most `max_blocks` blocks; the reader blocks while the queue is full and
/// closes the channel at end of input. A read error terminates the reader
/// and is reported through the returned join handle.
pub fn spawn_block_reader(
    mut reader: Box<dyn BufRead + Send>,
    block_size: usize,
    max_blocks: usize,
) -> (thread::JoinHandle<Result<()>>, Receiver<Vec<String>>) {
    let (tx, rx) = bounded(max_blocks);
    let handle = thread::spawn(move || {
        let mut block: Vec<String> = Vec::with_capacity(block_size);
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            block.push(std::mem::take(&mut line));
            if block.len() == block_size {
                let full = std::mem::replace(&mut block, Vec::with_capacity(block_size));
                if tx.send(full).is_err() {
                    // all receivers dropped; a worker has already failed
                    return Ok(());
                }
            }
        }
        if !block.is_empty() {
            let _ = tx.send(block);
        }
        Ok(())
    });
    (handle, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_blocks_and_remainder() {
        let text = (0..25).map(|i| format!("line{}\n", i)).collect::<String>();
        let reader: Box<dyn BufRead + Send> = Box::new(Cursor::new(text.into_bytes()));
        let (handle, rx) = spawn_block_reader(reader, 10, 4);
        let blocks: Vec<Vec<String>> = rx.iter().collect();
        handle.join().expect("reader thread panicked").unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].len(), 10);
        assert_eq!(blocks[2].len(), 5);
        assert_eq!(blocks[0][0], "line0");
        assert_eq!(blocks[2][4], "line24");
    }

    #[test]
    fn test_strips_line_terminators() {
        let reader: Box<dyn BufRead + Send> =
            Box::new(Cursor::new(b"a\r\nb\nc".to_vec()));
        let (handle, rx) = spawn_block_reader(reader, 10, 2);
        let blocks: Vec<Vec<String>> = rx.iter().collect();
        handle.join().expect("reader thread panicked").unwrap();
        assert_eq!(blocks, vec![vec!["a".to_string(), "b".into(), "c".into()]]);
    }
}
