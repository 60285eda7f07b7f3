use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::constants::MANIFEST_FILE_NAME;
use crate::metadata::{ExtractedRecord, ManifestSink, MetadataError};

pub struct JsonlManifest {
    writer: BufWriter<File>,
}

impl JsonlManifest {
    pub fn new(destination: &Path) -> Result<Self, MetadataError> {
        let file = File::create(destination.join(MANIFEST_FILE_NAME))?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl ManifestSink for JsonlManifest {
    fn record(&mut self, record: &ExtractedRecord) -> Result<(), MetadataError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), MetadataError> {
        self.writer.flush()?;
        Ok(())
    }
}
