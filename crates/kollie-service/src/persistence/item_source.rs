//! Generic JSON list sources

use std::marker::PhantomData;
use std::path::Path;

use serde::de::DeserializeOwned;

use kollie_common::{Error, Result};

/// Something that yields a list of items
pub trait ItemSource<T>: Send + Sync {
    /// Load every item
    fn load(&self) -> Result<Vec<T>>;
}

impl<T: Clone + Send + Sync> ItemSource<T> for Vec<T> {
    fn load(&self) -> Result<Vec<T>> {
        Ok(self.clone())
    }
}

/// A JSON array of items, read once when the source is built
///
/// An empty document holds no items.
#[derive(Clone, Debug)]
pub struct JsonItemSource<T> {
    json: String,
    origin: String,
    _item: PhantomData<fn() -> T>,
}

impl<T> JsonItemSource<T> {
    /// Read the JSON document from a file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;
        Ok(Self {
            json,
            origin: path.display().to_string(),
            _item: PhantomData,
        })
    }

    /// Use an in-memory JSON document
    pub fn from_json(json: impl Into<String>) -> Self {
        Self {
            json: json.into(),
            origin: "<inline>".to_string(),
            _item: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> ItemSource<T> for JsonItemSource<T> {
    fn load(&self) -> Result<Vec<T>> {
        if self.json.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&self.json).map_err(|e| {
            Error::config(format!("{} contains malformed JSON: {}", self.origin, e))
        })
    }
}
