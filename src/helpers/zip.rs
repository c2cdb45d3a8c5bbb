//! ZIP archive helpers for the container-based formats (XLSX and ODS).

use crate::error::RecordsError;
use crate::helpers::xml::XmlReader;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::ZipArchive;

pub(crate) trait ZipHelper<RS: Read + Seek> {
    /// Looks up an entry by name, ignoring ASCII case and path separator style.
    fn entry(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, RecordsError>;

    /// Whether the archive holds an entry with this name.
    fn contains(&self, name: &str) -> bool;

    /// Opens an entry as an XML event stream.
    fn xml_reader(&'_ mut self, name: &str) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, RecordsError>;

    /// Reads a (small) entry fully into memory.
    fn read_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>, RecordsError>;
}

fn normalize(name: &str) -> String {
    name.replace('\\', "/").trim_start_matches('/').to_owned()
}

impl<RS: Read + Seek> ZipHelper<RS> for ZipArchive<RS> {
    fn entry(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, RecordsError> {
        let wanted = normalize(name);
        let found = self
            .file_names()
            .find(|file_name| normalize(file_name).eq_ignore_ascii_case(&wanted))
            .map(str::to_owned);
        match found.map(|file_name| self.by_name(&file_name)).transpose() {
            Ok(file) => Ok(file),
            Err(ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error)?,
        }
    }

    fn contains(&self, name: &str) -> bool {
        let wanted = normalize(name);
        self.file_names()
            .any(|file_name| normalize(file_name).eq_ignore_ascii_case(&wanted))
    }

    fn xml_reader(&'_ mut self, name: &str) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, RecordsError> {
        Ok(self.entry(name)?.map(|file| XmlReader::new(BufReader::new(file))))
    }

    fn read_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>, RecordsError> {
        match self.entry(name)? {
            Some(mut file) => {
                let mut bytes = Vec::new();
                file.read_to_end(&mut bytes)?;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::CompressionMethod;
    use zip::ZipWriter;

    /// Builds an in-memory ZIP archive from `(name, content)` pairs.
    pub(crate) fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, content) in entries {
            writer.start_file(*name, options).expect("start zip entry");
            writer.write_all(content.as_bytes()).expect("write zip entry");
        }
        writer.finish().expect("finish zip").into_inner()
    }

    #[test]
    fn entry_lookup_is_case_insensitive() -> Result<(), RecordsError> {
        let bytes = build_zip(&[("xl/Workbook.xml", "<workbook/>"), ("mimetype", "text/plain")]);
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        assert!(zip.contains("xl/workbook.xml"));
        assert!(zip.contains("\\xl\\workbook.xml"));
        assert!(!zip.contains("xl/styles.xml"));
        assert_eq!(zip.read_bytes("MIMETYPE")?, Some(b"text/plain".to_vec()));
        assert!(zip.xml_reader("xl/styles.xml")?.is_none());
        Ok(())
    }
}
