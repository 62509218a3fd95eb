//! Byte-addressable image with holes, as loaded from a record-format file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::ihex;
use crate::error::Result;

/// Fill value for addresses not defined by an image.
pub const FILL: u8 = 0xFF;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SparseImage {
    bytes: BTreeMap<u32, u8>,
}

impl SparseImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// An image defining `data.len()` bytes starting at `start`.
    pub fn from_bytes(start: u32, data: &[u8]) -> Self {
        let mut image = Self::new();
        for (i, byte) in data.iter().enumerate() {
            image.set(start + i as u32, *byte);
        }
        image
    }

    /// Read and parse an Intel HEX file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(ihex::parse(&text)?)
    }

    /// Write the image as an Intel HEX file.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, ihex::to_string(self))?;
        Ok(())
    }

    pub fn get(&self, address: u32) -> Option<u8> {
        self.bytes.get(&address).copied()
    }

    pub fn set(&mut self, address: u32, value: u8) {
        self.bytes.insert(address, value);
    }

    /// Number of defined bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn min_address(&self) -> Option<u32> {
        self.bytes.keys().next().copied()
    }

    pub fn max_address(&self) -> Option<u32> {
        self.bytes.keys().next_back().copied()
    }

    /// Defined bytes in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u8)> + '_ {
        self.bytes.iter().map(|(a, b)| (*a, *b))
    }

    /// Take every byte defined by `other`, replacing ours on overlap.
    pub fn merge(&mut self, other: &SparseImage) {
        for (address, value) in other.iter() {
            self.set(address, value);
        }
    }

    /// The bytes from the lowest to the highest defined address, holes
    /// filled with [`FILL`].
    pub fn to_contiguous(&self) -> Vec<u8> {
        match (self.min_address(), self.max_address()) {
            (Some(min), Some(max)) => (min..=max)
                .map(|address| self.get(address).unwrap_or(FILL))
                .collect(),
            _ => Vec::new(),
        }
    }
}
