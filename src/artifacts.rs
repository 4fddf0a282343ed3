//! Loading and linking compiled contract artifacts
//!
//! Artifacts are the JSON output of the Solidity toolchain. The loader
//! searches the artifacts directory recursively for `<name>.json`, so both
//! the Hardhat layout (`artifacts/<source>.sol/<Name>.json`) and a flat
//! Foundry `out/` directory work unchanged.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use ethers::{
    abi::Abi,
    types::{Address, Bytes},
};
use serde::Deserialize;

use crate::{constants::NUM_BYTES_ADDRESS, errors::ScriptError};

/// A byte range inside contract bytecode occupied by a library placeholder
#[derive(Clone, Debug, Deserialize)]
pub struct LinkOffset {
    /// Byte offset of the placeholder within the bytecode
    pub start: usize,
    /// Placeholder width in bytes; always an address width in practice
    pub length: usize,
}

/// Link references grouped by source file, then library name
pub type LinkReferences = BTreeMap<String, BTreeMap<String, Vec<LinkOffset>>>;

/// The bytecode field of an artifact: Hardhat emits a bare hex string,
/// Foundry an object carrying the hex alongside its own link references
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    /// A `"0x..."` string
    Hex(String),
    /// A `{ "object": "0x...", "linkReferences": {...} }` object
    Object {
        /// The bytecode hex
        object: String,
        /// Link references scoped to this bytecode
        #[serde(rename = "linkReferences", default)]
        link_references: LinkReferences,
    },
}

/// The wire form of an artifact file
#[derive(Deserialize)]
struct RawArtifact {
    /// Contract name as recorded by the toolchain
    #[serde(rename = "contractName", default)]
    contract_name: Option<String>,
    /// Source path relative to the project root
    #[serde(rename = "sourceName", default)]
    source_name: Option<String>,
    /// The contract ABI
    abi: Abi,
    /// Deployment bytecode
    bytecode: RawBytecode,
    /// Top-level link references (Hardhat layout)
    #[serde(rename = "linkReferences", default)]
    link_references: LinkReferences,
}

/// A compiled contract, ready to be linked and deployed
#[derive(Clone, Debug)]
pub struct ContractArtifact {
    /// The contract name
    pub contract_name: String,
    /// Source path relative to the project root, when the toolchain records one
    pub source_name: Option<String>,
    /// The contract ABI
    pub abi: Abi,
    /// Deployment bytecode hex, `0x` prefix stripped
    bytecode: String,
    /// Placeholder ranges awaiting library addresses
    link_references: LinkReferences,
}

impl ContractArtifact {
    /// Load the artifact for `name` from `artifacts_dir`
    pub fn load(artifacts_dir: &Path, name: &str) -> Result<Self, ScriptError> {
        let path = find_artifact(artifacts_dir, name).ok_or_else(|| {
            ScriptError::ArtifactParsing(format!(
                "no artifact named {name} under {}",
                artifacts_dir.display()
            ))
        })?;

        let contents = fs::read_to_string(&path)
            .map_err(|e| ScriptError::ArtifactParsing(format!("{}: {}", path.display(), e)))?;
        let raw: RawArtifact = serde_json::from_str(&contents)
            .map_err(|e| ScriptError::ArtifactParsing(format!("{}: {}", path.display(), e)))?;

        let (bytecode, bytecode_refs) = match raw.bytecode {
            RawBytecode::Hex(hex) => (hex, LinkReferences::new()),
            RawBytecode::Object {
                object,
                link_references,
            } => (object, link_references),
        };
        let link_references = if raw.link_references.is_empty() {
            bytecode_refs
        } else {
            raw.link_references
        };

        Ok(Self {
            contract_name: raw.contract_name.unwrap_or_else(|| name.to_string()),
            source_name: raw.source_name,
            abi: raw.abi,
            bytecode: bytecode
                .strip_prefix("0x")
                .unwrap_or(&bytecode)
                .to_string(),
            link_references,
        })
    }

    /// Whether the bytecode carries unlinked library placeholders
    pub fn requires_linking(&self) -> bool {
        !self.link_references.is_empty()
    }

    /// Deployable bytecode with `libraries` spliced over the placeholder ranges.
    ///
    /// Every referenced library must be supplied; the EVM rejects bytecode
    /// with a placeholder left in it, so an unresolved one is fatal here.
    pub fn linked_bytecode(
        &self,
        libraries: &BTreeMap<String, Address>,
    ) -> Result<Bytes, ScriptError> {
        let mut code = self.bytecode.clone();

        for (source, libs) in &self.link_references {
            for (lib_name, offsets) in libs {
                let address = libraries.get(lib_name).ok_or_else(|| {
                    ScriptError::LibraryLinking(format!(
                        "no address supplied for library {source}:{lib_name}"
                    ))
                })?;
                let addr_hex = hex::encode(address.as_bytes());

                for offset in offsets {
                    let (start, end) = (offset.start * 2, (offset.start + offset.length) * 2);
                    if offset.length != NUM_BYTES_ADDRESS || end > code.len() {
                        return Err(ScriptError::LibraryLinking(format!(
                            "link reference for {lib_name} out of range in {}",
                            self.contract_name
                        )));
                    }
                    code.replace_range(start..end, &addr_hex);
                }
            }
        }

        if code.contains("__") {
            return Err(ScriptError::LibraryLinking(format!(
                "unresolved library placeholder in {} bytecode",
                self.contract_name
            )));
        }

        let raw = hex::decode(&code).map_err(|e| {
            ScriptError::ArtifactParsing(format!(
                "invalid bytecode hex for {}: {e}",
                self.contract_name
            ))
        })?;
        Ok(Bytes::from(raw))
    }
}

/// Recursively search `dir` for `<name>.json`
fn find_artifact(dir: &Path, name: &str) -> Option<PathBuf> {
    let target = format!("{name}.json");
    for entry in fs::read_dir(dir).ok()?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = find_artifact(&path, name) {
                return Some(found);
            }
        } else if path.file_name().and_then(|f| f.to_str()) == Some(target.as_str()) {
            return Some(path);
        }
    }
    None
}
