use assert_cmd::Command;
use assert_cmd::cargo;
use mockito::Server;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};
use zip::write::SimpleFileOptions;

const MODULE_CONFIG: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<config>
  <moduleName>Colorful Mod</moduleName>
  <installSteps>
    <installStep name="Pick">
      <optionalFileGroups>
        <group name="Colors" type="SelectExactlyOne">
          <plugins>
            <plugin name="Red">
              <description>Red textures</description>
              <files><folder source="Options\Red" destination="" /></files>
            </plugin>
            <plugin name="Blue">
              <description>Blue textures</description>
              <files><folder source="Options\Blue" destination="" /></files>
            </plugin>
          </plugins>
        </group>
      </optionalFileGroups>
    </installStep>
  </installSteps>
</config>"#;

fn write_zip(path: &Path, files: &[(&str, &str)]) {
    let file = fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, content) in files {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// A data directory with one game, "Game X".
struct Setup {
    dir: TempDir,
}

impl Setup {
    fn new() -> Self {
        Self::with_user_config("")
    }

    fn with_user_config(extra: &str) -> Self {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("user_config.yaml"),
            format!(
                "download_path: {}\nstaging_path: {}\n{}",
                root.join("downloads").display(),
                root.join("staging").display(),
                extra
            ),
        )
        .unwrap();
        fs::create_dir_all(root.join("game_configs")).unwrap();
        fs::write(
            root.join("game_configs/game-x.yaml"),
            format!(
                "name: Game X\nnexus_game_id: gamex\ngame_path: {}\nmods_path: Mods\n",
                root.join("games/X").display()
            ),
        )
        .unwrap();
        fs::create_dir_all(root.join("downloads/Game X")).unwrap();
        Self { dir }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn downloads(&self) -> PathBuf {
        self.root().join("downloads/Game X")
    }

    fn staging(&self) -> PathBuf {
        self.root().join("staging/Game X")
    }

    fn mods(&self) -> PathBuf {
        self.root().join("games/X/Mods")
    }

    fn nomm(&self) -> Command {
        let mut cmd = Command::new(cargo::cargo_bin!("nomm"));
        cmd.env("NOMM_DATA_DIR", self.root())
            .env_remove("NOMM_API_KEY")
            .env_remove("NOMM_GAME")
            .arg("--game")
            .arg("gamex");
        cmd
    }
}

#[test]
fn test_install_plain_archive_and_list() {
    let setup = Setup::new();
    fs::write(
        setup.downloads().join(".downloads.nomm.yaml"),
        "info:\n  game: Game X\n  nexus_game_id: gamex\nmods:\n  mymod.zip:\n    name: My Mod\n    version: '1.0'\n    mod_id: 42\n",
    )
    .unwrap();
    write_zip(
        &setup.downloads().join("mymod.zip"),
        &[("MyModFolder/plugin.pak", "data")],
    );

    setup
        .nomm()
        .args(["install", "mymod.zip"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Installed 'My Mod': MyModFolder (disabled)"));

    assert!(setup.staging().join("MyModFolder/plugin.pak").exists());
    let ledger = fs::read_to_string(setup.staging().join(".staging.nomm.yaml")).unwrap();
    assert!(ledger.contains("My Mod"));
    assert!(ledger.contains("status: disabled"));

    setup
        .nomm()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("disabled My Mod 1.0"))
        .stdout(predicate::str::contains("0 enabled, 1 disabled, 1/1 downloads installed"));

    setup
        .nomm()
        .arg("downloads")
        .assert()
        .success()
        .stdout(predicate::str::contains("installed   mymod.zip (My Mod 1.0)"));
}

#[test]
fn test_inspect_and_install_option() {
    let setup = Setup::new();
    write_zip(
        &setup.downloads().join("colors.zip"),
        &[
            ("fomod/ModuleConfig.xml", MODULE_CONFIG),
            ("Options/Red/red.dds", "red"),
            ("Options/Blue/blue.dds", "blue"),
        ],
    );

    setup
        .nomm()
        .args(["inspect", "colors.zip"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Colorful Mod (2 options)"))
        .stdout(predicate::str::contains("Blue [Options/Blue]"));

    setup
        .nomm()
        .args(["install", "colors.zip"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("installer option required"));

    setup
        .nomm()
        .args(["install", "colors.zip", "--option", "blue"])
        .assert()
        .success();

    assert!(setup.staging().join("Blue/blue.dds").exists());
    assert!(!setup.staging().join("Red").exists());
}

#[cfg(unix)]
#[test]
fn test_enable_disable_uninstall() {
    let setup = Setup::new();
    write_zip(
        &setup.downloads().join("mymod.zip"),
        &[("MyModFolder/plugin.pak", "data")],
    );
    setup.nomm().args(["install", "mymod.zip"]).assert().success();

    setup
        .nomm()
        .args(["enable", "mymod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Enabled 'mymod'"));
    let link = setup.mods().join("MyModFolder");
    assert!(link.is_symlink());
    assert_eq!(
        fs::read_to_string(link.join("plugin.pak")).unwrap(),
        "data"
    );

    setup.nomm().args(["disable", "mymod"]).assert().success();
    assert!(!link.exists());

    setup.nomm().args(["enable", "mymod"]).assert().success();
    setup
        .nomm()
        .args(["uninstall", "mymod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 root(s) removed"));
    assert!(!link.is_symlink());
    assert!(!setup.staging().join("MyModFolder").exists());
}

#[test]
fn test_install_refuses_root_of_another_mod() {
    let setup = Setup::new();
    write_zip(&setup.downloads().join("first.zip"), &[("Shared/a.pak", "a")]);
    write_zip(&setup.downloads().join("second.zip"), &[("Shared/b.pak", "b")]);
    setup.nomm().args(["install", "first.zip"]).assert().success();

    setup
        .nomm()
        .args(["install", "second.zip"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already staged by mod 'first'"));
    assert!(setup.staging().join("Shared/a.pak").exists());
}

#[test]
fn test_unknown_mod_fails() {
    let setup = Setup::new();
    setup
        .nomm()
        .args(["enable", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Mod 'ghost' is not in the staging ledger"));
}

#[test]
fn test_unknown_game_fails() {
    let setup = Setup::new();
    Command::new(cargo::cargo_bin!("nomm"))
        .env("NOMM_DATA_DIR", setup.root())
        .args(["--game", "skyrim", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No game config matches 'skyrim'"));
}

#[test]
fn test_remove_download() {
    let setup = Setup::new();
    write_zip(&setup.downloads().join("old.zip"), &[("Old/o.txt", "o")]);

    setup
        .nomm()
        .args(["remove-download", "old.zip"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed old.zip"));
    assert!(!setup.downloads().join("old.zip").exists());
}

#[test]
fn test_check_updates_against_mock_catalog() {
    let mut server = Server::new();
    let _mod_info = server
        .mock("GET", "/v1/games/gamex/mods/42.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"name": "My Mod", "version": "1.1"}"#)
        .create();
    let _changelogs = server
        .mock("GET", "/v1/games/gamex/mods/42/changelogs.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"1.1": ["Fixed crash on load"]}"#)
        .create();

    let setup = Setup::with_user_config(&format!("api_url: {}\n", server.url()));
    fs::write(
        setup.downloads().join(".downloads.nomm.yaml"),
        "info:\n  game: Game X\n  nexus_game_id: gamex\nmods:\n  mymod.zip:\n    name: My Mod\n    version: '1.0'\n    mod_id: 42\n",
    )
    .unwrap();
    write_zip(&setup.downloads().join("mymod.zip"), &[("MyModFolder/a", "a")]);
    setup.nomm().args(["install", "mymod.zip"]).assert().success();

    setup
        .nomm()
        .arg("check-updates")
        .assert()
        .success()
        .stdout(predicate::str::contains("My Mod: new version 1.1"))
        .stdout(predicate::str::contains("Fixed crash on load"));

    setup
        .nomm()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("(update: 1.1)"));
}

#[test]
fn test_download_requires_api_key() {
    let setup = Setup::new();
    setup
        .nomm()
        .args(["download", "nxm://gamex/mods/42/files/7?key=a&expires=1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No Nexus API key"));
}
