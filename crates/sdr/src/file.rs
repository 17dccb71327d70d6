// Copyright 2025-2026 CEMAXECUTER LLC

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crossbeam::channel::Sender;

use crate::{BlockSource, SampleBlock};

/// IQ file replay: reads interleaved int16 little-endian I/Q pairs and sends
/// them as planar SampleBlock blocks. The first block carries the reset flag,
/// the way a live front-end marks the start of a stream.
pub struct FileSource {
    path: String,
    sample_rate: u32,
    /// Number of complex samples per block
    block_size: usize,
    running: bool,
}

impl FileSource {
    pub fn new(path: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            path: path.into(),
            sample_rate,
            block_size: 4096,
            running: false,
        }
    }

    pub fn set_block_size(&mut self, size: usize) {
        self.block_size = size;
    }

    /// Read up to num_samples complex samples, splitting the interleaved pairs
    /// into planar I and Q lanes. Returns None at end of file.
    fn read_block(
        reader: &mut BufReader<File>,
        num_samples: usize,
    ) -> std::io::Result<Option<(Vec<i16>, Vec<i16>)>> {
        let bytes_needed = num_samples * 4; // 4 bytes per complex sample
        let mut buf = vec![0u8; bytes_needed];
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        let actual_samples = n / 4;
        let mut xi = Vec::with_capacity(actual_samples);
        let mut xq = Vec::with_capacity(actual_samples);
        for i in 0..actual_samples {
            let base = i * 4;
            xi.push(i16::from_le_bytes([buf[base], buf[base + 1]]));
            xq.push(i16::from_le_bytes([buf[base + 2], buf[base + 3]]));
        }
        Ok(Some((xi, xq)))
    }
}

impl BlockSource for FileSource {
    fn start(&mut self, tx: Sender<SampleBlock>) -> Result<(), String> {
        let path = Path::new(&self.path);
        let file = File::open(path).map_err(|e| format!("failed to open {}: {}", self.path, e))?;
        let mut reader = BufReader::with_capacity(1024 * 1024, file);

        self.running = true;
        log::info!("reading IQ from {} ({} Hz)", self.path, self.sample_rate);

        let mut first = true;
        while self.running {
            match Self::read_block(&mut reader, self.block_size) {
                Ok(Some((xi, xq))) => {
                    let num_samples = xi.len();
                    let block = SampleBlock {
                        xi,
                        xq,
                        num_samples,
                        reset: first,
                        gain_change_pending: false,
                    };
                    first = false;
                    if tx.send(block).is_err() {
                        break; // receiver dropped
                    }
                }
                Ok(None) => {
                    log::info!("end of file: {}", self.path);
                    break;
                }
                Err(e) => {
                    return Err(format!("read error: {}", e));
                }
            }
        }

        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_source_splits_interleaved_pairs() {
        let dir = std::env::temp_dir();
        let path = dir.join("rspaudio_file_source_test.iq");
        {
            let mut f = File::create(&path).unwrap();
            // Three complex samples: (1,-2), (300,-400), (5,6)
            for v in [1i16, -2, 300, -400, 5, 6] {
                f.write_all(&v.to_le_bytes()).unwrap();
            }
        }

        let mut src = FileSource::new(path.to_str().unwrap(), 96_000);
        let (tx, rx) = crossbeam::channel::unbounded();
        src.start(tx).unwrap();

        let block = rx.recv().unwrap();
        assert_eq!(block.num_samples, 3);
        assert_eq!(block.xi, vec![1, 300, 5]);
        assert_eq!(block.xq, vec![-2, -400, 6]);
        assert!(block.reset);
        assert!(!block.gain_change_pending);
        assert!(rx.recv().is_err()); // sender dropped after EOF

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_file_source_reset_only_on_first_block() {
        let dir = std::env::temp_dir();
        let path = dir.join("rspaudio_file_source_reset_test.iq");
        {
            let mut f = File::create(&path).unwrap();
            for v in 0..8i16 {
                f.write_all(&v.to_le_bytes()).unwrap();
            }
        }

        // 8 int16 values = 4 complex samples, two blocks of two
        let mut src = FileSource::new(path.to_str().unwrap(), 96_000);
        src.set_block_size(2);
        let (tx, rx) = crossbeam::channel::unbounded();
        src.start(tx).unwrap();

        let blocks: Vec<SampleBlock> = rx.iter().collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].reset);
        assert!(!blocks[1].reset);

        std::fs::remove_file(&path).ok();
    }
}
