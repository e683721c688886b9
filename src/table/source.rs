use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::errors::Result;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Open an annotation-table path, transparently handling optional
/// bgzip/gzip compression. BGZF is itself a valid gzip byte stream, so a
/// single `MultiGzDecoder` path handles both.
pub fn open_table(path: &Path) -> Result<Box<dyn BufRead>> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let n = file.read(&mut magic)?;
    drop(file);

    let file = File::open(path)?;
    if n == 2 && magic == GZIP_MAGIC {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}
