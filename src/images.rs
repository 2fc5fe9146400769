/// Image cache for widget pictures: small images stay inline as data URLs,
/// large ones go to IndexedDB in chunks and are referenced as `idb:<id>`

use crate::error::{LauncherError, LauncherResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;
use uuid::Uuid;
use wasm_bindgen::prelude::*;

/// Prefix of a config value that points into the image store
pub const IMAGE_REF_PREFIX: &str = "idb:";

// IndexedDB glue: one database, one object store keyed by id
#[wasm_bindgen(module = "/images.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn putImage(record: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn getImage(id: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn deleteImage(id: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn listImageIds() -> Result<JsValue, JsValue>;
}

/// Size thresholds for the inline/stored split
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePolicy {
    pub inline_limit_bytes: usize,
    pub chunk_bytes: usize,
}

impl Default for ImagePolicy {
    fn default() -> Self {
        ImagePolicy {
            inline_limit_bytes: 100 * 1024,
            chunk_bytes: 256 * 1024,
        }
    }
}

/// A stored image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub id: String,
    pub data: String,
    pub size: usize,
    pub created: f64,
}

/// On-disk layout of an `ImageRecord`: the data URL split into chunks.
/// Records written whole as `{id, data, size, created}` still read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredImage {
    pub id: String,
    #[serde(default)]
    pub chunks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    pub size: usize,
    pub created: f64,
}

impl ImageRecord {
    pub fn into_stored(self, chunk_bytes: usize) -> StoredImage {
        StoredImage {
            chunks: split_chunks(&self.data, chunk_bytes),
            data: None,
            id: self.id,
            size: self.size,
            created: self.created,
        }
    }
}

impl StoredImage {
    pub fn into_record(self) -> ImageRecord {
        ImageRecord {
            data: match self.data {
                Some(data) if self.chunks.is_empty() => data,
                _ => self.chunks.concat(),
            },
            id: self.id,
            size: self.size,
            created: self.created,
        }
    }
}

/// Where an image ended up
#[derive(Debug, Clone, PartialEq)]
pub enum ImagePlacement {
    Inline(String),
    Stored(ImageRecord),
}

impl ImagePlacement {
    /// Value to put into the referencing config
    pub fn reference(&self) -> String {
        match self {
            ImagePlacement::Inline(data) => data.clone(),
            ImagePlacement::Stored(record) => image_ref(&record.id),
        }
    }
}

/// Parsed header of a data URL
#[derive(Debug, Clone, PartialEq)]
pub struct DataUrl<'a> {
    pub mime: &'a str,
    pub base64: bool,
    pub payload: &'a str,
}

fn data_url_regex() -> LauncherResult<&'static Regex> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^data:([A-Za-z0-9.+-]+/[A-Za-z0-9.+-]+)?((?:;[A-Za-z0-9-]+=[^;,]*)*)(;base64)?,")
    })
    .as_ref()
    .map_err(|e| LauncherError::Images(format!("data URL pattern: {}", e)))
}

pub fn parse_data_url(input: &str) -> LauncherResult<DataUrl<'_>> {
    let caps = data_url_regex()?
        .captures(input)
        .ok_or_else(|| LauncherError::Images("not a data URL".to_string()))?;
    let header_len = caps.get(0).map_or(0, |m| m.end());

    Ok(DataUrl {
        mime: caps.get(1).map_or("text/plain", |m| m.as_str()),
        base64: caps.get(3).is_some(),
        payload: &input[header_len..],
    })
}

impl DataUrl<'_> {
    /// Byte size of the decoded payload
    pub fn decoded_size(&self) -> usize {
        if !self.base64 {
            return self.payload.len();
        }
        let len = self.payload.len();
        let padding = self.payload.bytes().rev().take_while(|&b| b == b'=').count().min(2);
        let tail = match len % 4 {
            2 => 1,
            3 => 2,
            _ => 0,
        };
        ((len / 4) * 3 + tail).saturating_sub(padding)
    }
}

impl ImagePolicy {
    /// Decide whether `data_url` stays inline or goes to the store
    pub fn place(&self, data_url: &str, now: f64) -> LauncherResult<ImagePlacement> {
        let parsed = parse_data_url(data_url)?;
        if !parsed.mime.starts_with("image/") {
            return Err(LauncherError::Images(format!("unsupported type {}", parsed.mime)));
        }

        let size = parsed.decoded_size();
        if size <= self.inline_limit_bytes {
            return Ok(ImagePlacement::Inline(data_url.to_string()));
        }

        Ok(ImagePlacement::Stored(ImageRecord {
            id: Uuid::new_v4().to_string(),
            data: data_url.to_string(),
            size,
            created: now,
        }))
    }
}

pub fn image_ref(id: &str) -> String {
    format!("{}{}", IMAGE_REF_PREFIX, id)
}

/// The stored id behind an `idb:` reference
pub fn parse_image_ref(value: &str) -> Option<&str> {
    value
        .strip_prefix(IMAGE_REF_PREFIX)
        .filter(|id| !id.is_empty())
}

/// Stored ids that no config value references any more
pub fn orphaned_ids<'a>(stored: &[String], references: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let live: HashSet<&str> = references.into_iter().filter_map(parse_image_ref).collect();
    stored
        .iter()
        .filter(|id| !live.contains(id.as_str()))
        .cloned()
        .collect()
}

/// Split on char boundaries into pieces of at most `chunk_bytes` bytes
fn split_chunks(data: &str, chunk_bytes: usize) -> Vec<String> {
    let chunk_bytes = chunk_bytes.max(4);
    let mut chunks = Vec::new();
    let mut rest = data;

    while !rest.is_empty() {
        let mut end = rest.len().min(chunk_bytes);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let (head, tail) = rest.split_at(end);
        chunks.push(head.to_string());
        rest = tail;
    }
    chunks
}

/// Async access to the IndexedDB object store
pub struct ImageStore {
    policy: ImagePolicy,
}

impl ImageStore {
    pub fn new(policy: ImagePolicy) -> Self {
        ImageStore { policy }
    }

    /// Store an image if it is too large to keep inline; returns the config value
    pub async fn save(&self, data_url: &str) -> LauncherResult<String> {
        let placement = self.policy.place(data_url, js_sys::Date::now())?;
        let reference = placement.reference();

        if let ImagePlacement::Stored(record) = placement {
            log::debug!("storing image {} ({} bytes)", record.id, record.size);
            let stored = record.into_stored(self.policy.chunk_bytes);
            let value = serde_wasm_bindgen::to_value(&stored)
                .map_err(|e| LauncherError::encode("image record", format!("{:?}", e)))?;
            putImage(value)
                .await
                .map_err(|e| LauncherError::Images(format!("put failed: {:?}", e)))?;
        }
        Ok(reference)
    }

    /// Resolve a config value to a displayable data URL
    pub async fn load(&self, reference: &str) -> LauncherResult<Option<String>> {
        let Some(id) = parse_image_ref(reference) else {
            return Ok(Some(reference.to_string()));
        };

        let value = getImage(id)
            .await
            .map_err(|e| LauncherError::Images(format!("get failed: {:?}", e)))?;
        if value.is_null() || value.is_undefined() {
            log::warn!("image {} missing from store", id);
            return Ok(None);
        }

        let stored: StoredImage = serde_wasm_bindgen::from_value(value)
            .map_err(|e| LauncherError::decode("image record", format!("{:?}", e)))?;
        Ok(Some(stored.into_record().data))
    }

    pub async fn remove(&self, reference: &str) -> LauncherResult<()> {
        match parse_image_ref(reference) {
            Some(id) => deleteImage(id)
                .await
                .map_err(|e| LauncherError::Images(format!("delete failed: {:?}", e))),
            None => Ok(()),
        }
    }

    /// Delete every stored image the given config values no longer reference
    pub async fn collect_orphans(&self, references: &[String]) -> LauncherResult<usize> {
        let ids_js = listImageIds()
            .await
            .map_err(|e| LauncherError::Images(format!("list failed: {:?}", e)))?;
        let stored: Vec<String> = serde_wasm_bindgen::from_value(ids_js)
            .map_err(|e| LauncherError::decode("image ids", format!("{:?}", e)))?;

        let orphans = orphaned_ids(&stored, references.iter().map(String::as_str));
        for id in &orphans {
            deleteImage(id)
                .await
                .map_err(|e| LauncherError::Images(format!("delete failed: {:?}", e)))?;
        }
        if !orphans.is_empty() {
            log::info!("removed {} orphaned images", orphans.len());
        }
        Ok(orphans.len())
    }
}

impl Default for ImageStore {
    fn default() -> Self {
        Self::new(ImagePolicy::default())
    }
}
