//! Thin helpers over `noodles::bgzf` shared by `score`, `eval`, and `apply`.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use noodles::bgzf;

/// Open `path` for BGZF-compressed writing, truncating any existing file.
pub fn create_bgzf_writer(path: &Path) -> io::Result<bgzf::Writer<File>> {
    let file = File::create(path)?;
    Ok(bgzf::Writer::new(file))
}

/// Open a BGZF-compressed file for reading, transparently decompressing.
pub fn open_bgzf_reader(path: &Path) -> io::Result<bgzf::Reader<File>> {
    let file = File::open(path)?;
    Ok(bgzf::Reader::new(file))
}

/// Write the standard two-line provenance header shared by `.sites.gz` and
/// `.tab` outputs: a `##` version line and a `##` command line, each
/// terminated with `\n`.
pub fn write_provenance_header<W: Write>(
    mut out: W,
    version: &str,
    command: &str,
) -> io::Result<()> {
    writeln!(out, "##somfilter_version={version}")?;
    writeln!(out, "##command={command}")
}

/// A small convenience wrapper so `score`/`eval` can build a buffered plain
/// writer when the caller wants an uncompressed `.tab` file.
pub fn create_plain_writer(path: &Path) -> io::Result<BufWriter<File>> {
    Ok(BufWriter::new(File::create(path)?))
}
