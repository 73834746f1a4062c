//! Bad-block report written by `badblocks -o`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadBlockReport {
    pub path: PathBuf,
    pub blocks: Vec<u64>,
}

impl BadBlockReport {
    /// Parse one block number per line. An empty file is a clean surface.
    pub fn read(path: &Path) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        let blocks = parse_blocks(&text)?;
        if !blocks.is_empty() {
            log::warn!("⚠️ {} bad block(s) found", blocks.len());
        }
        Ok(Self {
            path: path.to_path_buf(),
            blocks,
        })
    }

    pub fn is_clean(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn count(&self) -> usize {
        self.blocks.len()
    }
}

fn parse_blocks(text: &str) -> io::Result<Vec<u64>> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| {
            l.parse::<u64>().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("malformed bad block entry: {:?}", l),
                )
            })
        })
        .collect()
}
