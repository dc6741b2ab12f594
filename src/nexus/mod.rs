//! Nexus Mods catalog: REST client and `nxm://` links.

mod client;
mod nxm;
pub mod types;

pub use client::{DEFAULT_API_URL, ModCatalog, NexusClient};
#[cfg(test)]
pub use client::MockModCatalog;
pub use nxm::NxmLink;
pub use types::{ChangelogEntry, Changelogs, DownloadLink, FileInfo, ModInfo};
