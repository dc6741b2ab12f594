//! FOMOD `ModuleConfig.xml` reading.
//!
//! Only a flat list of mutually exclusive options is understood: every
//! `plugin` element anywhere in the document becomes one [`InstallerOption`],
//! whatever install step or group it sits in. Conditional file installs and
//! multi-step wizards are not modelled.

use anyhow::{Context, Result, anyhow};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

const DESCRIPTOR_SUFFIX: &str = "fomod/moduleconfig.xml";
const DEFAULT_MODULE_NAME: &str = "Unknown Mod";
const DEFAULT_DESCRIPTION: &str = "No description provided.";

/// One selectable option of a multi-option package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerOption {
    pub name: String,
    pub description: String,
    /// Folder inside the archive, `/` separated, as declared by the descriptor.
    pub source_folder: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    pub module_name: String,
    pub options: Vec<InstallerOption>,
}

/// First entry whose path ends in `fomod/ModuleConfig.xml`, ignoring case.
pub fn find_descriptor<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    names
        .into_iter()
        .find(|name| name.to_lowercase().ends_with(DESCRIPTOR_SUFFIX))
}

/// Decode descriptor bytes, honouring UTF-8 and UTF-16 byte order marks.
fn decode(bytes: &[u8]) -> Result<String> {
    match bytes {
        [0xEF, 0xBB, 0xBF, rest @ ..] => {
            String::from_utf8(rest.to_vec()).context("Descriptor is not valid UTF-8")
        }
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
        _ => String::from_utf8(bytes.to_vec()).context("Descriptor is not valid UTF-8"),
    }
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(anyhow!("Descriptor has an odd number of UTF-16 bytes"));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).context("Descriptor is not valid UTF-16")
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == key
            && let Ok(value) = attr.unescape_value()
        {
            return Some(value.to_string());
        }
    }
    None
}

#[derive(Default)]
struct PendingPlugin {
    name: Option<String>,
    description: Option<String>,
    source_folder: Option<String>,
}

impl PendingPlugin {
    fn finish(self) -> Option<InstallerOption> {
        let name = self.name.filter(|n| !n.trim().is_empty())?;
        let source_folder = self.source_folder?;
        Some(InstallerOption {
            name,
            description: self
                .description
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            source_folder,
        })
    }

    fn take_folder(&mut self, e: &BytesStart<'_>) {
        if self.source_folder.is_none()
            && let Some(source) = attr_value(e, b"source")
        {
            let normalized = source.replace('\\', "/").trim_matches('/').to_string();
            if !normalized.is_empty() {
                self.source_folder = Some(normalized);
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    None,
    ModuleName,
    Description,
}

/// Parse a `ModuleConfig.xml` document.
///
/// Plugins without a name or without any `folder` element are left out.
/// Malformed XML is an error.
pub fn parse_module_config(bytes: &[u8]) -> Result<ModuleConfig> {
    let text = decode(bytes)?;
    let mut reader = Reader::from_str(&text);
    reader.trim_text(true);

    let mut module_name: Option<String> = None;
    let mut options = Vec::new();
    let mut current: Option<PendingPlugin> = None;
    let mut target = TextTarget::None;

    loop {
        match reader
            .read_event()
            .with_context(|| format!("Malformed descriptor at byte {}", reader.buffer_position()))?
        {
            Event::Start(e) => match e.local_name().as_ref() {
                b"moduleName" if module_name.is_none() => target = TextTarget::ModuleName,
                b"plugin" => {
                    current = Some(PendingPlugin {
                        name: attr_value(&e, b"name"),
                        ..PendingPlugin::default()
                    })
                }
                b"description" if current.as_ref().is_some_and(|p| p.description.is_none()) => {
                    target = TextTarget::Description
                }
                b"folder" => {
                    if let Some(plugin) = current.as_mut() {
                        plugin.take_folder(&e);
                    }
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"folder" => {
                    if let Some(plugin) = current.as_mut() {
                        plugin.take_folder(&e);
                    }
                }
                b"plugin" => {
                    // A self-closing plugin has no files to install.
                }
                _ => {}
            },
            Event::Text(t) => {
                let value = t.unescape().context("Malformed text in descriptor")?;
                store_text(target, value.trim(), &mut module_name, current.as_mut());
            }
            Event::CData(t) => {
                let value = String::from_utf8_lossy(&t.into_inner()).to_string();
                store_text(target, value.trim(), &mut module_name, current.as_mut());
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"plugin" => {
                    if let Some(option) = current.take().and_then(PendingPlugin::finish) {
                        options.push(option);
                    }
                }
                b"moduleName" | b"description" => target = TextTarget::None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(ModuleConfig {
        module_name: module_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_MODULE_NAME.to_string()),
        options,
    })
}

fn store_text(
    target: TextTarget,
    value: &str,
    module_name: &mut Option<String>,
    plugin: Option<&mut PendingPlugin>,
) {
    match target {
        TextTarget::ModuleName => module_name.get_or_insert_with(String::new).push_str(value),
        TextTarget::Description => {
            if let Some(plugin) = plugin {
                plugin
                    .description
                    .get_or_insert_with(String::new)
                    .push_str(value);
            }
        }
        TextTarget::None => {}
    }
}
