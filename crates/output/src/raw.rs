use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use rsp_agc::{AudioSink, SinkError};

/// Writes interleaved I/Q samples as raw little-endian int16 PCM.
///
/// This is the stream format websdr and most pipe consumers expect:
/// two 16-bit channels (I then Q), no framing, no header.
pub struct RawWriter<W: Write> {
    writer: W,
}

impl<W: Write> RawWriter<W> {
    pub fn new(writer: W) -> Self {
        RawWriter { writer }
    }

    fn write_block(&mut self, samples: &[i16]) -> io::Result<()> {
        for &s in samples {
            self.writer.write_i16::<LittleEndian>(s)?;
        }
        // Flush per block so a downstream pipe sees audio promptly.
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> AudioSink for RawWriter<W> {
    fn write(&mut self, samples: &[i16]) -> Result<(), SinkError> {
        match self.write_block(samples) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(SinkError::Backpressure),
            Err(e) => Err(SinkError::Failed(format!("raw output: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_interleaved_le_bytes() {
        let mut writer = RawWriter::new(Vec::new());
        writer.write(&[1, -2, 256]).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(
            bytes,
            vec![0x01, 0x00, 0xFE, 0xFF, 0x00, 0x01],
            "samples should be little-endian int16 in order"
        );
    }

    #[test]
    fn test_empty_block_writes_nothing() {
        let mut writer = RawWriter::new(Vec::new());
        writer.write(&[]).unwrap();
        assert!(writer.into_inner().is_empty());
    }

    struct FullPipe;

    impl Write for FullPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "pipe full"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader gone"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_would_block_maps_to_backpressure() {
        let mut writer = RawWriter::new(FullPipe);
        match writer.write(&[1]) {
            Err(SinkError::Backpressure) => {}
            other => panic!("expected backpressure, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_broken_pipe_maps_to_failed() {
        let mut writer = RawWriter::new(BrokenPipe);
        match writer.write(&[1]) {
            Err(SinkError::Failed(msg)) => assert!(msg.contains("reader gone")),
            other => panic!("expected failure, got {:?}", other.err()),
        }
    }
}
