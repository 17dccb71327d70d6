// Copyright 2025-2026 CEMAXECUTER LLC

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rsp_agc::TelemetrySink;

/// Publishes the current gain reduction to a small text file.
///
/// websdr polls this file, so each update rewrites the first line in
/// place rather than appending. The value is relative to the configured
/// floor; a fresh file reads 0.
pub struct GainFile {
    file: File,
    path: PathBuf,
}

impl GainFile {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let mut file = File::create(path)?;
        file.write_all(b"0\n")?;
        Ok(GainFile {
            file,
            path: path.to_path_buf(),
        })
    }

    fn rewrite(&mut self, value: i32) -> std::io::Result<()> {
        // Rewind and overwrite; a shorter value leaves stale bytes past the
        // newline, which line-oriented readers never see.
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(format!("{}\n", value).as_bytes())?;
        Ok(())
    }
}

impl TelemetrySink for GainFile {
    fn publish(&mut self, value: i32) {
        if let Err(e) = self.rewrite(value) {
            log::warn!("gain file {}: write failed: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_path(tag: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("rsp_gainfile_{}_{}", tag, std::process::id()));
        p
    }

    #[test]
    fn test_fresh_file_reads_zero() {
        let path = temp_path("fresh");
        let _gf = GainFile::create(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "0\n");
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_publish_overwrites_in_place() {
        let path = temp_path("overwrite");
        let mut gf = GainFile::create(&path).unwrap();
        gf.publish(12);
        assert_eq!(fs::read_to_string(&path).unwrap(), "12\n");
        gf.publish(9);
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents.lines().next(),
            Some("9"),
            "first line should hold the latest value"
        );
        fs::remove_file(&path).unwrap();
    }
}
