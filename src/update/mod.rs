//! Update Checker.
//!
//! Queries the remote catalog for every staged mod that carries a `mod_id`
//! and reports which ones have a different remote version. The checker never
//! writes a ledger; its findings are applied by the caller in one write.

use futures_util::stream::{self, StreamExt};
use log::{debug, info, warn};

use crate::ledger::{StagingLedger, UpdateInfo};
use crate::nexus::ModCatalog;

pub const DEFAULT_CONCURRENCY: usize = 4;

/// A mod whose remote query failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateFailure {
    pub mod_name: String,
    pub message: String,
}

/// Result of one update sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Mods whose remote version differs from the local one, sorted by name.
    pub updates: Vec<UpdateInfo>,
    pub failures: Vec<UpdateFailure>,
    /// Number of mods that were queried.
    pub checked: usize,
}

impl UpdateReport {
    pub fn has_updates(&self) -> bool {
        !self.updates.is_empty()
    }
}

enum Outcome {
    Current,
    Update(UpdateInfo),
    Failed(UpdateFailure),
}

pub struct UpdateChecker<'a, C: ModCatalog + ?Sized> {
    catalog: &'a C,
    concurrency: usize,
}

impl<'a, C: ModCatalog + ?Sized> UpdateChecker<'a, C> {
    pub fn new(catalog: &'a C) -> Self {
        Self {
            catalog,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Compare every staged mod with a `mod_id` against the catalog.
    ///
    /// Without `info.nexus_game_id` in the ledger there is nothing to query
    /// and the report is empty. A failure for one mod is recorded in the
    /// report and does not stop the others.
    #[tracing::instrument(skip(self, ledger))]
    pub async fn check(&self, ledger: &StagingLedger) -> UpdateReport {
        let Some(game) = ledger
            .info
            .as_ref()
            .and_then(|i| i.nexus_game_id.clone())
            .filter(|g| !g.trim().is_empty())
        else {
            debug!("Staging ledger has no nexus_game_id; skipping update check");
            return UpdateReport::default();
        };

        let candidates: Vec<(String, String, String)> = ledger
            .mods
            .iter()
            .filter_map(|(name, record)| {
                let mod_id = record.mod_id.clone().filter(|id| !id.trim().is_empty())?;
                Some((
                    name.clone(),
                    mod_id,
                    record.version.clone().unwrap_or_default(),
                ))
            })
            .collect();

        let mut report = UpdateReport {
            checked: candidates.len(),
            ..UpdateReport::default()
        };

        let outcomes = stream::iter(candidates)
            .map(|(mod_name, mod_id, local_version)| {
                let game = game.clone();
                async move {
                    self.check_one(&game, mod_name, &mod_id, &local_version)
                        .await
                }
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        for outcome in outcomes {
            match outcome {
                Outcome::Current => {}
                Outcome::Update(update) => report.updates.push(update),
                Outcome::Failed(failure) => report.failures.push(failure),
            }
        }
        report.updates.sort_by(|a, b| a.mod_name.cmp(&b.mod_name));
        report.failures.sort_by(|a, b| a.mod_name.cmp(&b.mod_name));

        info!(
            "Checked {} mod(s): {} update(s), {} failure(s)",
            report.checked,
            report.updates.len(),
            report.failures.len()
        );
        report
    }

    async fn check_one(
        &self,
        game: &str,
        mod_name: String,
        mod_id: &str,
        local_version: &str,
    ) -> Outcome {
        let remote = match self.catalog.mod_info(game, mod_id).await {
            Ok(info) => info.version.unwrap_or_default(),
            Err(e) => {
                warn!("Error checking {}: {:#}", mod_name, e);
                return Outcome::Failed(UpdateFailure {
                    mod_name,
                    message: format!("{:#}", e),
                });
            }
        };

        // Plain string comparison: any difference counts as an update.
        if remote.is_empty() || remote == local_version {
            return Outcome::Current;
        }

        let changelog = match self.catalog.changelogs(game, mod_id).await {
            Ok(mut logs) => logs.remove(&remote).map(|entry| entry.into_text()),
            Err(e) => {
                warn!("Could not fetch changelog for {}: {:#}", mod_name, e);
                None
            }
        };

        debug!("{}: {} -> {}", mod_name, local_version, remote);
        Outcome::Update(UpdateInfo {
            mod_name,
            new_version: remote,
            changelog,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerInfo, StagingRecord};
    use crate::nexus::{ChangelogEntry, Changelogs, MockModCatalog, ModInfo};
    use anyhow::anyhow;
    use mockall::predicate::eq;

    fn ledger(mods: &[(&str, &str, Option<&str>)]) -> StagingLedger {
        let mut ledger = StagingLedger {
            info: Some(LedgerInfo {
                game: Some("Game X".into()),
                nexus_game_id: Some("gamex".into()),
            }),
            ..StagingLedger::default()
        };
        for (name, version, mod_id) in mods {
            ledger.mods.insert(
                name.to_string(),
                StagingRecord {
                    version: Some(version.to_string()),
                    mod_id: mod_id.map(str::to_string),
                    mod_files: vec![format!("{}Folder", name)],
                    ..StagingRecord::default()
                },
            );
        }
        ledger
    }

    fn remote(version: &str) -> ModInfo {
        ModInfo {
            name: None,
            version: Some(version.to_string()),
        }
    }

    #[tokio::test]
    async fn test_same_version_is_not_an_update() {
        let mut catalog = MockModCatalog::new();
        catalog
            .expect_mod_info()
            .with(eq("gamex"), eq("42"))
            .times(1)
            .returning(|_, _| Ok(remote("1.0")));
        catalog.expect_changelogs().never();

        let report = UpdateChecker::new(&catalog)
            .check(&ledger(&[("My Mod", "1.0", Some("42"))]))
            .await;

        assert_eq!(report.checked, 1);
        assert!(!report.has_updates());
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_different_version_carries_changelog() {
        let mut catalog = MockModCatalog::new();
        catalog
            .expect_mod_info()
            .returning(|_, _| Ok(remote("1.1")));
        catalog.expect_changelogs().times(1).returning(|_, _| {
            let mut logs = Changelogs::new();
            logs.insert(
                "1.1".into(),
                ChangelogEntry::Lines(vec!["Fixed crash".into(), "New textures".into()]),
            );
            logs.insert("1.0".into(), ChangelogEntry::Text("Initial".into()));
            Ok(logs)
        });

        let report = UpdateChecker::new(&catalog)
            .check(&ledger(&[("My Mod", "1.0", Some("42"))]))
            .await;

        assert_eq!(
            report.updates,
            vec![UpdateInfo {
                mod_name: "My Mod".into(),
                new_version: "1.1".into(),
                changelog: Some("Fixed crash\nNew textures".into()),
            }]
        );
    }

    #[tokio::test]
    async fn test_older_remote_version_is_still_flagged() {
        let mut catalog = MockModCatalog::new();
        catalog
            .expect_mod_info()
            .returning(|_, _| Ok(remote("0.9")));
        catalog
            .expect_changelogs()
            .returning(|_, _| Ok(Changelogs::new()));

        let report = UpdateChecker::new(&catalog)
            .check(&ledger(&[("My Mod", "1.0", Some("42"))]))
            .await;

        assert_eq!(report.updates.len(), 1);
        assert_eq!(report.updates[0].new_version, "0.9");
        assert_eq!(report.updates[0].changelog, None);
    }

    #[test_log::test(tokio::test)]
    async fn test_failure_does_not_stop_other_mods() {
        let mut catalog = MockModCatalog::new();
        catalog
            .expect_mod_info()
            .with(eq("gamex"), eq("1"))
            .returning(|_, _| Err(anyhow!("connection reset")));
        catalog
            .expect_mod_info()
            .with(eq("gamex"), eq("2"))
            .returning(|_, _| Ok(remote("2.0")));
        catalog
            .expect_changelogs()
            .returning(|_, _| Err(anyhow!("rate limited")));

        let report = UpdateChecker::new(&catalog)
            .with_concurrency(2)
            .check(&ledger(&[
                ("Broken", "1.0", Some("1")),
                ("Fine", "1.0", Some("2")),
                ("Manual", "1.0", None),
            ]))
            .await;

        assert_eq!(report.checked, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].mod_name, "Broken");
        assert!(report.failures[0].message.contains("connection reset"));
        assert_eq!(report.updates.len(), 1);
        assert_eq!(report.updates[0].mod_name, "Fine");
        assert_eq!(report.updates[0].changelog, None);
    }

    #[tokio::test]
    async fn test_no_game_id_is_a_no_op() {
        let mut catalog = MockModCatalog::new();
        catalog.expect_mod_info().never();

        let mut ledger = ledger(&[("My Mod", "1.0", Some("42"))]);
        ledger.info = None;

        let report = UpdateChecker::new(&catalog).check(&ledger).await;
        assert_eq!(report, UpdateReport::default());
    }

    #[tokio::test]
    async fn test_empty_remote_version_is_ignored() {
        let mut catalog = MockModCatalog::new();
        catalog
            .expect_mod_info()
            .returning(|_, _| Ok(ModInfo::default()));

        let report = UpdateChecker::new(&catalog)
            .check(&ledger(&[("My Mod", "1.0", Some("42"))]))
            .await;
        assert!(!report.has_updates());
    }
}
