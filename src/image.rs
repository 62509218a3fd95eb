//! Flash layout and the images written to it.
//!
//! The module flash is made of 256-byte pages. The program area starts at
//! page 0, the configuration occupies page [`CONFIG_PAGE`] and the factory
//! information page [`INFO_PAGE`].
//!
//! Configuration page layout:
//!
//! ```text
//! offset  size  content
//!      0     1  program size, in pages
//!      1     1  code protection (0xFF unprotected, 0x00 protected)
//!      4     4  API version
//!      8     4  application version
//!     12    16  application description, NUL terminated
//! ```

pub mod ihex;
mod sparse;

pub use sparse::{SparseImage, FILL};

use std::fmt;

use crate::error::ProgramError;

pub const PAGE_SIZE: usize = 256;
pub const CONFIG_PAGE: u8 = 127;
pub const INFO_PAGE: u8 = 128;

pub const PROGRAM_SIZE_OFFSET: usize = 0;
pub const CODE_PROTECT_OFFSET: usize = 1;
pub const CODE_PROTECT_OFF: u8 = 0xFF;
pub const CODE_PROTECT_ON: u8 = 0x00;

/// The 256 bytes of the configuration page.
#[derive(Clone, PartialEq, Eq)]
pub struct ConfigImage([u8; PAGE_SIZE]);

impl ConfigImage {
    /// An erased page.
    pub fn blank() -> Self {
        ConfigImage([FILL; PAGE_SIZE])
    }

    /// `None` unless `data` is exactly one page long.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() != PAGE_SIZE {
            return None;
        }
        let mut page = [0u8; PAGE_SIZE];
        page.copy_from_slice(data);
        Some(ConfigImage(page))
    }

    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.0
    }

    pub fn set(&mut self, offset: usize, value: u8) {
        self.0[offset] = value;
    }

    /// True for a never programmed chip.
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|b| *b == FILL)
    }

    /// Size of the program area, in pages.
    pub fn program_pages(&self) -> u8 {
        self.0[PROGRAM_SIZE_OFFSET]
    }

    pub fn code_protect(&self) -> u8 {
        self.0[CODE_PROTECT_OFFSET]
    }

    pub fn is_code_protected(&self) -> bool {
        self.code_protect() == CODE_PROTECT_ON
    }

    pub fn clear_code_protect(&mut self) {
        self.0[CODE_PROTECT_OFFSET] = CODE_PROTECT_OFF;
    }

    pub fn api_version(&self) -> [u8; 4] {
        [self.0[4], self.0[5], self.0[6], self.0[7]]
    }

    pub fn app_version(&self) -> [u8; 4] {
        [self.0[8], self.0[9], self.0[10], self.0[11]]
    }

    pub fn description(&self) -> String {
        let raw = &self.0[12..28];
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }

    pub fn to_sparse(&self) -> SparseImage {
        SparseImage::from_bytes(0, &self.0)
    }
}

impl From<[u8; PAGE_SIZE]> for ConfigImage {
    fn from(page: [u8; PAGE_SIZE]) -> Self {
        ConfigImage(page)
    }
}

impl fmt::Debug for ConfigImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigImage")
            .field("program_pages", &self.program_pages())
            .field("code_protect", &self.code_protect())
            .field("api_version", &self.api_version())
            .field("app_version", &self.app_version())
            .field("description", &self.description())
            .finish()
    }
}

impl fmt::Display for ConfigImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dotted = |v: [u8; 4]| format!("{}.{}.{}.{}", v[0], v[1], v[2], v[3]);
        writeln!(f, "API version:     {}", dotted(self.api_version()))?;
        writeln!(f, "App version:     {}", dotted(self.app_version()))?;
        write!(f, "App description: {}", self.description())
    }
}

/// Contents of the program area, a whole number of pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage(Vec<u8>);

impl ProgramImage {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, ProgramError> {
        if data.len() % PAGE_SIZE != 0 {
            return Err(ProgramError::WrongImageSize { size: data.len() });
        }
        Ok(ProgramImage(data))
    }

    /// Flatten a record-format image, filling holes with [`FILL`].
    pub fn from_sparse(image: &SparseImage) -> Result<Self, ProgramError> {
        Self::from_bytes(image.to_contiguous())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pages(&self) -> usize {
        self.0.len() / PAGE_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConfigImage {
        let mut page = [FILL; PAGE_SIZE];
        page[0] = 2;
        page[4..12].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        page[12..17].copy_from_slice(b"lamp\0");
        ConfigImage::from_bytes(&page).unwrap()
    }

    #[test]
    fn decodes_fields() {
        let config = sample();
        assert_eq!(config.program_pages(), 2);
        assert!(!config.is_code_protected());
        assert_eq!(config.api_version(), [1, 2, 3, 4]);
        assert_eq!(config.app_version(), [5, 6, 7, 8]);
        assert_eq!(config.description(), "lamp");
        assert!(!config.is_blank());
    }

    #[test]
    fn description_without_terminator_takes_sixteen_bytes() {
        let mut config = ConfigImage::blank();
        for (i, c) in b"0123456789abcdefXYZ".iter().enumerate() {
            config.set(12 + i, *c);
        }
        assert_eq!(config.description(), "0123456789abcdef");
    }

    #[test]
    fn code_protect_flag() {
        let mut config = sample();
        config.set(CODE_PROTECT_OFFSET, CODE_PROTECT_ON);
        assert!(config.is_code_protected());
        config.clear_code_protect();
        assert_eq!(config.code_protect(), 0xFF);
    }

    #[test]
    fn config_must_be_one_page() {
        assert!(ConfigImage::from_bytes(&[0; 255]).is_none());
        assert!(ConfigImage::blank().is_blank());
    }

    #[test]
    fn program_must_be_whole_pages() {
        assert_eq!(
            ProgramImage::from_bytes(vec![0; 300]),
            Err(ProgramError::WrongImageSize { size: 300 })
        );
        assert_eq!(ProgramImage::from_bytes(vec![0; 512]).unwrap().pages(), 2);
    }

    #[test]
    fn program_from_sparse_pads_holes() {
        let mut image = SparseImage::new();
        image.set(0, 0x12);
        image.set(255, 0x34);
        let program = ProgramImage::from_sparse(&image).unwrap();
        assert_eq!(program.len(), 256);
        assert_eq!(program.as_bytes()[1], FILL);
    }
}
