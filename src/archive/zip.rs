use crate::runtime::Runtime;
use anyhow::{Context, Result, anyhow};
use log::debug;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

use super::{ArchiveEntry, ArchiveExtractor, Deadline, EntryMapper, clean_entry_name, is_contained};
use crate::runtime::ReadSeek;

/// Extractor for .zip archives
pub struct ZipExtractor;

impl ZipExtractor {
    fn open<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
    ) -> Result<ZipArchive<Box<dyn ReadSeek>>> {
        let file = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;
        ZipArchive::new(file).context("Failed to parse ZIP archive")
    }
}

fn entry_name(raw: &str) -> String {
    clean_entry_name(raw).trim_end_matches('/').to_string()
}

impl ArchiveExtractor for ZipExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".zip")
    }

    fn entries<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
    ) -> Result<Vec<ArchiveEntry>> {
        let mut archive = self.open(runtime, archive_path)?;
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive
                .by_index(i)
                .with_context(|| format!("Failed to read ZIP entry {}", i))?;
            let name = entry_name(entry.name());
            if name.is_empty() {
                continue;
            }
            entries.push(ArchiveEntry {
                name,
                is_dir: entry.is_dir(),
            });
        }
        Ok(entries)
    }

    fn read_entry<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        name: &str,
    ) -> Result<Vec<u8>> {
        let mut archive = self.open(runtime, archive_path)?;
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .with_context(|| format!("Failed to read ZIP entry {}", i))?;
            if entry.is_dir() || entry_name(entry.name()) != name {
                continue;
            }
            let mut buffer = Vec::new();
            entry
                .read_to_end(&mut buffer)
                .with_context(|| format!("Failed to read {} from archive", name))?;
            return Ok(buffer);
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
        debug!("Extracting zip archive to {:?}...", extract_to);
        let mut archive = self.open(runtime, archive_path)?;
        let mut written = 0;

        for i in 0..archive.len() {
            deadline.check()?;
            let mut entry = archive
                .by_index(i)
                .with_context(|| format!("Failed to read ZIP entry {}", i))?;

            if entry.enclosed_name().is_none() {
                debug!("Skipping entry with invalid path: {}", entry.name());
                continue;
            }
            let name = entry_name(entry.name());
            let Some(relative) = mapper(&name) else {
                continue;
            };
            if !is_contained(&relative) {
                debug!("Skipping entry outside the extraction root: {}", name);
                continue;
            }

            let full_path = extract_to.join(&relative);
            if entry.is_dir() {
                runtime.create_dir_all(&full_path)?;
                continue;
            }
            if let Some(parent) = full_path.parent() {
                runtime.create_dir_all(parent)?;
            }
            let mut dest_file = runtime.create_file(&full_path)?;
            std::io::copy(&mut entry, &mut dest_file)
                .with_context(|| format!("Failed to extract file {:?}", full_path))?;
            written += 1;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode()
                && let Err(e) = runtime.set_permissions(&full_path, mode)
            {
                debug!("Failed to set permissions on {:?}: {}", full_path, e);
            }
        }

        debug!("Extracted {} file(s) from {:?}", written, archive_path);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_support::write_zip;
    use crate::runtime::{MockRuntime, RealRuntime};
    use std::fs::{self, File};
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::tempdir;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    fn keep_all(name: &str) -> Option<PathBuf> {
        Some(PathBuf::from(name))
    }

    #[test]
    fn test_can_handle_zip() {
        let extractor = ZipExtractor;
        assert!(extractor.can_handle(Path::new("file.zip")));
        assert!(extractor.can_handle(Path::new("FILE.ZIP")));
        assert!(!extractor.can_handle(Path::new("file.rar")));
        assert!(!extractor.can_handle(Path::new("file.zip.part")));
    }

    #[test]
    fn test_entries_lists_files_and_dirs() -> Result<()> {
        let dir = tempdir()?;
        let archive = dir.path().join("mod.zip");
        write_zip(
            &archive,
            &[("MyModFolder/", ""), ("MyModFolder/a.pak", "a"), ("b.txt", "b")],
        );

        let entries = ZipExtractor.entries(&RealRuntime, &archive)?;
        assert_eq!(
            entries,
            vec![
                ArchiveEntry {
                    name: "MyModFolder".into(),
                    is_dir: true
                },
                ArchiveEntry {
                    name: "MyModFolder/a.pak".into(),
                    is_dir: false
                },
                ArchiveEntry {
                    name: "b.txt".into(),
                    is_dir: false
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn test_read_entry() -> Result<()> {
        let dir = tempdir()?;
        let archive = dir.path().join("mod.zip");
        write_zip(&archive, &[("fomod/ModuleConfig.xml", "<config/>")]);

        let bytes = ZipExtractor.read_entry(&RealRuntime, &archive, "fomod/ModuleConfig.xml")?;
        assert_eq!(bytes, b"<config/>");

        let missing = ZipExtractor.read_entry(&RealRuntime, &archive, "nope.xml");
        assert!(missing.is_err());
        Ok(())
    }

    #[test]
    fn test_extract_entries_preserves_structure() -> Result<()> {
        let dir = tempdir()?;
        let archive = dir.path().join("mod.zip");
        let out = dir.path().join("out");
        write_zip(
            &archive,
            &[("foo/file1.txt", "foo1"), ("bar/sub/file2.txt", "bar2"), ("top.txt", "t")],
        );

        let written = ZipExtractor.extract_entries(
            &RealRuntime,
            &archive,
            &out,
            &keep_all,
            &Deadline::unbounded(),
        )?;

        assert_eq!(written, 3);
        assert_eq!(fs::read_to_string(out.join("foo/file1.txt"))?, "foo1");
        assert_eq!(fs::read_to_string(out.join("bar/sub/file2.txt"))?, "bar2");
        assert_eq!(fs::read_to_string(out.join("top.txt"))?, "t");
        Ok(())
    }

    #[test]
    fn test_extract_entries_with_mapper_rewrites_paths() -> Result<()> {
        let dir = tempdir()?;
        let archive = dir.path().join("mod.zip");
        let out = dir.path().join("out");
        write_zip(
            &archive,
            &[("pkg/options/blue/a.pak", "blue"), ("pkg/options/red/a.pak", "red")],
        );

        let mapper = |name: &str| {
            name.strip_prefix("pkg/options/blue/")
                .map(|rest| PathBuf::from("Blue").join(rest))
        };
        let written = ZipExtractor.extract_entries(
            &RealRuntime,
            &archive,
            &out,
            &mapper,
            &Deadline::unbounded(),
        )?;

        assert_eq!(written, 1);
        assert_eq!(fs::read_to_string(out.join("Blue/a.pak"))?, "blue");
        assert!(!out.join("red").exists());
        Ok(())
    }

    #[test]
    fn test_extract_entries_expired_deadline() -> Result<()> {
        let dir = tempdir()?;
        let archive = dir.path().join("mod.zip");
        write_zip(&archive, &[("a.txt", "a")]);

        let result = ZipExtractor.extract_entries(
            &RealRuntime,
            &archive,
            &dir.path().join("out"),
            &keep_all,
            &Deadline::after(Duration::ZERO),
        );
        assert!(result.unwrap_err().to_string().contains("timed out"));
        Ok(())
    }

    #[test]
    fn test_extract_corrupted_archive() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("test.zip");
        fs::write(&archive, "corrupted data").unwrap();

        let result = ZipExtractor.entries(&RealRuntime, &archive);
        assert!(
            format!("{:#}", result.unwrap_err()).contains("Failed to parse ZIP archive")
        );
    }

    #[test]
    fn test_open_failure_goes_through_runtime() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_open()
            .returning(|_| Err(anyhow!("No such file or directory")));

        let result = ZipExtractor.entries(&runtime, Path::new("/downloads/missing.zip"));
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to open archive")
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_extract_preserves_file_permissions() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir()?;
        let archive = dir.path().join("test.zip");
        let out = dir.path().join("out");
        {
            let file = File::create(&archive)?;
            let mut zip = ZipWriter::new(file);
            let options = SimpleFileOptions::default().unix_permissions(0o755);
            zip.start_file("tools/patch.sh", options)?;
            zip.write_all(b"#!/bin/sh\necho patched")?;
            let options = SimpleFileOptions::default().unix_permissions(0o644);
            zip.start_file("tools/readme.txt", options)?;
            zip.write_all(b"docs")?;
            zip.finish()?;
        }

        ZipExtractor.extract_entries(
            &RealRuntime,
            &archive,
            &out,
            &keep_all,
            &Deadline::unbounded(),
        )?;

        let script_mode = fs::metadata(out.join("tools/patch.sh"))?.permissions().mode();
        assert!(script_mode & 0o111 != 0);
        let readme_mode = fs::metadata(out.join("tools/readme.txt"))?.permissions().mode();
        assert!(readme_mode & 0o111 == 0);
        Ok(())
    }
}
