use super::cpz::md5::Md5Variant;
use crate::error::CmvsError;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const BUNDLED_SCHEMES_PATH: &str = "cmvs/schemes.json";

/// Parameters of one CMVS encryption scheme.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CmvsScheme {
    pub name: String,
    pub version: u8,
    pub md5_variant: Md5Variant,
    pub cpz5_secret: Vec<u32>,
    pub decoder_factor: u32,
    pub index_seed: u32,
    pub index_addend: u32,
    pub index_subtrahend: u8,
    pub entry_init_key: u32,
    pub entry_sub_key: u32,
    pub entry_tail_key: u8,
    pub entry_key_pos: usize,
    pub dir_key_addend: [u32; 4],
    /// Archive keys of CPZ7 titles that ship without `start.ps3`
    pub archive_keys: HashMap<String, [u32; 4]>,
}

impl Default for CmvsScheme {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: 5,
            md5_variant: Md5Variant::default(),
            cpz5_secret: Vec::new(),
            decoder_factor: 0x1A74F195,
            index_seed: 0x3795B39A,
            index_addend: 0x784C5062,
            index_subtrahend: 0x7D,
            entry_init_key: 0x2748C39E,
            entry_sub_key: 0x5C39E87B,
            entry_tail_key: 0xAE,
            entry_key_pos: 10,
            dir_key_addend: [0, 0x11003322, 0, 0x34216785],
            archive_keys: HashMap::new(),
        }
    }
}

impl CmvsScheme {
    fn validate(&self) -> anyhow::Result<()> {
        if self.cpz5_secret.is_empty() {
            return Err(CmvsError::InvalidScheme(
                self.name.clone(),
                String::from("secret is empty"),
            )
            .into());
        }
        if !(5..=7).contains(&self.version) {
            return Err(CmvsError::InvalidScheme(
                self.name.clone(),
                format!("unsupported version {}", self.version),
            )
            .into());
        }
        Ok(())
    }
}

/// Known schemes, tried in order when an archive is opened.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SchemeDatabase {
    pub schemes: Vec<CmvsScheme>,
}

impl SchemeDatabase {
    pub fn new(schemes: Vec<CmvsScheme>) -> anyhow::Result<Self> {
        schemes.iter().try_for_each(CmvsScheme::validate)?;
        Ok(Self { schemes })
    }
    pub fn from_json(buf: &[u8]) -> anyhow::Result<Self> {
        let database: Self = serde_json::from_slice(buf)
            .context("Could not deserialize schemes database")?;
        Self::new(database.schemes)
    }
    /// Database embedded into the library
    pub fn bundled() -> anyhow::Result<Self> {
        Self::from_json(
            &crate::Resources::get(BUNDLED_SCHEMES_PATH).context(format!(
                "Could not find file: {}",
                BUNDLED_SCHEMES_PATH
            ))?,
        )
    }
    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }
    pub fn schemes_for(
        &self,
        version: u8,
    ) -> impl Iterator<Item = &CmvsScheme> + '_ {
        self.schemes.iter().filter(move |s| s.version == version)
    }
}
