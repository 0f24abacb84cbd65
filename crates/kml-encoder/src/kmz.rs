//! KMZ packaging: the document as `wms.kml` plus the images and icons it
//! refers to by relative path.

use std::io::{Seek, Write};

use kml_common::{KmlError, KmlResult};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const KML_ENTRY: &str = "wms.kml";

pub fn image_entry(index: usize) -> String {
    format!("images/layer_{}.png", index)
}

pub fn icon_entry(name: &str) -> String {
    format!("icons/{}.png", name)
}

pub struct KmzWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: FileOptions,
    entries: usize,
}

impl<W: Write + Seek> KmzWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            zip: ZipWriter::new(sink),
            options: FileOptions::default().compression_method(CompressionMethod::Deflated),
            entries: 0,
        }
    }

    pub fn entry(&mut self, name: &str, bytes: &[u8]) -> KmlResult<()> {
        self.zip.start_file(name, self.options).map_err(zip_error)?;
        self.zip.write_all(bytes).map_err(KmlError::Stream)?;
        self.entries += 1;
        Ok(())
    }

    pub fn kml(&mut self, document: &[u8]) -> KmlResult<()> {
        self.entry(KML_ENTRY, document)
    }

    pub fn image(&mut self, index: usize, png: &[u8]) -> KmlResult<()> {
        self.entry(&image_entry(index), png)
    }

    pub fn icon(&mut self, name: &str, png: &[u8]) -> KmlResult<()> {
        self.entry(&icon_entry(name), png)
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Write the central directory and hand back the sink.
    pub fn finish(mut self) -> KmlResult<W> {
        self.zip.finish().map_err(zip_error)
    }
}

fn zip_error(err: ZipError) -> KmlError {
    match err {
        ZipError::Io(e) => KmlError::Stream(e),
        other => KmlError::Internal(format!("KMZ packaging failed: {}", other)),
    }
}
