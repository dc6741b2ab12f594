use crate::runtime::Runtime;
use anyhow::{Result, anyhow};
use log::debug;
use std::path::Path;
use unrar::Archive;

use super::{ArchiveEntry, ArchiveExtractor, Deadline, EntryMapper, clean_entry_name, is_contained};

/// Extractor for .rar archives.
///
/// libunrar works on real paths, so reads bypass the runtime; writes of
/// directories still go through it.
pub struct RarExtractor;

fn header_name(filename: &Path) -> String {
    clean_entry_name(&filename.to_string_lossy())
        .trim_end_matches('/')
        .to_string()
}

impl ArchiveExtractor for RarExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".rar")
    }

    fn entries<R: Runtime + 'static>(
        &self,
        _runtime: &R,
        archive_path: &Path,
    ) -> Result<Vec<ArchiveEntry>> {
        let listing = Archive::new(archive_path)
            .open_for_listing()
            .map_err(|e| anyhow!("Failed to open RAR archive {:?}: {:?}", archive_path, e))?;

        let mut entries = Vec::new();
        for header in listing {
            let header =
                header.map_err(|e| anyhow!("Failed to read RAR header in {:?}: {:?}", archive_path, e))?;
            let name = header_name(&header.filename);
            if name.is_empty() {
                continue;
            }
            entries.push(ArchiveEntry {
                name,
                is_dir: header.is_directory(),
            });
        }
        Ok(entries)
    }

    fn read_entry<R: Runtime + 'static>(
        &self,
        _runtime: &R,
        archive_path: &Path,
        name: &str,
    ) -> Result<Vec<u8>> {
        let mut archive = Archive::new(archive_path)
            .open_for_processing()
            .map_err(|e| anyhow!("Failed to open RAR archive {:?}: {:?}", archive_path, e))?;

        while let Some(header) = archive
            .read_header()
            .map_err(|e| anyhow!("Failed to read RAR header in {:?}: {:?}", archive_path, e))?
        {
            if header.entry().is_file() && header_name(&header.entry().filename) == name {
                let (bytes, _) = header
                    .read()
                    .map_err(|e| anyhow!("Failed to read {} from archive: {:?}", name, e))?;
                return Ok(bytes);
            }
            archive = header
                .skip()
                .map_err(|e| anyhow!("Failed to skip RAR entry: {:?}", e))?;
        }
        Err(anyhow!("Entry {} not found in {:?}", name, archive_path))
    }

    fn extract_entries<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
        mapper: EntryMapper<'_>,
        deadline: &Deadline,
    ) -> Result<usize> {
        debug!("Extracting rar archive to {:?}...", extract_to);
        let mut archive = Archive::new(archive_path)
            .open_for_processing()
            .map_err(|e| anyhow!("Failed to open RAR archive {:?}: {:?}", archive_path, e))?;
        let mut written = 0;

        while let Some(header) = archive
            .read_header()
            .map_err(|e| anyhow!("Failed to read RAR header in {:?}: {:?}", archive_path, e))?
        {
            deadline.check()?;
            let name = header_name(&header.entry().filename);
            let target = mapper(&name).filter(|relative| is_contained(relative));

            archive = match target {
                Some(relative) if header.entry().is_file() => {
                    let full_path = extract_to.join(&relative);
                    if let Some(parent) = full_path.parent() {
                        runtime.create_dir_all(parent)?;
                    }
                    written += 1;
                    header
                        .extract_to(&full_path)
                        .map_err(|e| anyhow!("Failed to extract file {:?}: {:?}", full_path, e))?
                }
                Some(relative) => {
                    runtime.create_dir_all(&extract_to.join(&relative))?;
                    header
                        .skip()
                        .map_err(|e| anyhow!("Failed to skip RAR entry: {:?}", e))?
                }
                None => header
                    .skip()
                    .map_err(|e| anyhow!("Failed to skip RAR entry: {:?}", e))?,
            };
        }

        debug!("Extracted {} file(s) from {:?}", written, archive_path);
        Ok(written)
    }
}
