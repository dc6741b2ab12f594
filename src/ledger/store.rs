use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::runtime::Runtime;

/// A YAML ledger document on disk.
///
/// Every mutation is a whole-file read, modify and write. Writes go to a
/// sibling `.tmp` file that is then renamed over the ledger, so a crash never
/// leaves a half-written document behind.
pub struct LedgerFile<'a, R: Runtime, T> {
    runtime: &'a R,
    path: PathBuf,
    _document: PhantomData<T>,
}

impl<'a, R, T> LedgerFile<'a, R, T>
where
    R: Runtime,
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(runtime: &'a R, path: PathBuf) -> Self {
        Self {
            runtime,
            path,
            _document: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ledger_error(&self, source: anyhow::Error) -> Error {
        Error::Ledger {
            path: self.path.clone(),
            source,
        }
    }

    /// Load the document. A missing or blank file is an empty ledger.
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<T> {
        if !self.runtime.exists(&self.path) {
            return Ok(T::default());
        }
        let content = self
            .runtime
            .read_to_string(&self.path)
            .map_err(|e| self.ledger_error(e))?;
        if content.trim().is_empty() {
            return Ok(T::default());
        }
        serde_yaml::from_str(&content)
            .context("Failed to parse ledger")
            .map_err(|e| self.ledger_error(e))
    }

    /// Replace the document on disk.
    #[tracing::instrument(skip(self, document), fields(path = %self.path.display()))]
    pub fn save(&self, document: &T) -> Result<()> {
        self.save_inner(document).map_err(|e| self.ledger_error(e))
    }

    fn save_inner(&self, document: &T) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent()
            && !self.runtime.exists(parent)
        {
            self.runtime.create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(document).context("Failed to serialize ledger")?;
        let tmp = self.tmp_path();
        self.runtime
            .write(&tmp, content.as_bytes())
            .with_context(|| format!("Failed to write {:?}", tmp))?;
        if let Err(e) = self.runtime.rename(&tmp, &self.path) {
            let _ = self.runtime.remove_file(&tmp);
            return Err(e).with_context(|| format!("Failed to replace {:?}", self.path));
        }
        Ok(())
    }

    /// Load, apply `change`, then save, as one unit.
    pub fn update<O>(&self, change: impl FnOnce(&mut T) -> Result<O>) -> Result<O> {
        let mut document = self.load()?;
        let out = change(&mut document)?;
        self.save(&document)?;
        Ok(out)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
