//! Sequential byte view over a segment's sealed parts.

use std::io::{self, Read};
use std::sync::Arc;

use crate::part::SealedPart;

/// Reads the concatenated content of a fixed list of sealed parts.
///
/// The part list is a snapshot: parts sealed after the reader was created
/// are not visible. Readers are single-pass; create a new one to start over.
#[derive(Debug, Clone)]
pub struct PartsReader {
    parts: Vec<Arc<SealedPart>>,
    cur_part: usize,
    cur_pos: usize,
}

impl PartsReader {
    pub fn new(parts: Vec<Arc<SealedPart>>) -> Self {
        Self {
            parts,
            cur_part: 0,
            cur_pos: 0,
        }
    }

    /// Total bytes across all parts, read or not.
    pub fn len(&self) -> u64 {
        self.parts.iter().map(|p| p.content().len() as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes not yet returned by [`Read::read`].
    pub fn remaining(&self) -> u64 {
        let rest: u64 = self
            .parts
            .iter()
            .skip(self.cur_part)
            .map(|p| p.content().len() as u64)
            .sum();
        rest - self.cur_pos as u64
    }
}

impl Read for PartsReader {
    /// Fill `buf` from the current position, crossing part boundaries as
    /// needed. Returns `Ok(0)` once every part is exhausted.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut n = 0;

        while n < buf.len() {
            let Some(part) = self.parts.get(self.cur_part) else {
                break;
            };
            let content = &part.content()[self.cur_pos..];
            let copied = content.len().min(buf.len() - n);
            buf[n..n + copied].copy_from_slice(&content[..copied]);
            self.cur_pos += copied;
            n += copied;

            // advance eagerly so an exhausted part never yields a zero-length read
            if self.cur_pos == part.content().len() {
                self.cur_part += 1;
                self.cur_pos = 0;
            }
        }

        Ok(n)
    }
}
