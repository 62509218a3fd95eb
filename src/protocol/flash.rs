//! Page and byte level flash access.
//!
//! Every operation sends one command frame and expects one acknowledgement
//! frame. Bulk payloads follow the first acknowledgement: pages read back
//! from the module, or pages written to it, the latter being confirmed by a
//! second acknowledgement.

use std::fmt;

use log::{debug, info};

use super::frame::{build_command, opcode, validate_response, Frame};
use super::hex_dump;
use super::transport::Transport;
use crate::error::{Error, ProgramError, Result, VerifyError};
use crate::image::{
    ConfigImage, CODE_PROTECT_OFFSET, CODE_PROTECT_ON, CONFIG_PAGE, INFO_PAGE, PAGE_SIZE,
};
use crate::link::Link;

const LOT_OFFSET: usize = 2;
const ID_OFFSET: usize = 64;
const LOCK_OFFSET: usize = 255;
const LOCK_SENTINEL: u8 = 0x7F;

/// Bootloader firmware version.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BootloaderVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}
impl fmt::Display for BootloaderVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Factory data from the information page.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChipInfo {
    /// Production lot; four ASCII characters and a number.
    pub lot: [u8; 5],
    pub id: [u8; 4],
    /// The information page lock sentinel is set.
    pub locked: bool,
}

impl ChipInfo {
    pub fn from_page(page: &[u8]) -> Self {
        let mut lot = [0u8; 5];
        lot.copy_from_slice(&page[LOT_OFFSET..LOT_OFFSET + 5]);
        let mut id = [0u8; 4];
        id.copy_from_slice(&page[ID_OFFSET..ID_OFFSET + 4]);
        ChipInfo {
            lot,
            id,
            locked: page[LOCK_OFFSET] == LOCK_SENTINEL,
        }
    }

    /// The module id as uppercase hex, e.g. `0180A1B2`.
    pub fn id_hex(&self) -> String {
        self.id.iter().map(|b| format!("{:02X}", b)).collect()
    }

    pub fn lot_string(&self) -> String {
        let prefix: String = self.lot[..4].iter().map(|b| *b as char).collect();
        format!("{}{:02X}", prefix, self.lot[4])
    }
}

impl fmt::Display for ChipInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "lot:  {}", self.lot_string())?;
        writeln!(f, "id:   {}", self.id_hex())?;
        write!(f, "lock: {}", if self.locked { "yes" } else { "no" })
    }
}

/// Flash primitives on top of a [`Transport`].
pub struct FlashAccess<'a> {
    transport: Transport<'a>,
}

impl<'a> FlashAccess<'a> {
    pub fn new(transport: Transport<'a>) -> Self {
        FlashAccess { transport }
    }

    pub fn transport(&mut self) -> &mut Transport<'a> {
        &mut self.transport
    }

    pub fn link(&mut self) -> &mut dyn Link {
        self.transport.link()
    }

    /// Send `command` and check the acknowledgement that comes back.
    fn exchange(&mut self, command: Frame, expected_ack: u8) -> Result<Frame> {
        hex_dump("command", &command);
        self.transport.send(&command)?;
        let ack = self.transport.receive_frame()?;
        hex_dump("ack", &ack);
        validate_response(&ack, expected_ack)?;
        Ok(ack)
    }

    /// Wait for the acknowledgement closing a bulk write.
    fn confirm(&mut self) -> Result<()> {
        let ack = self.transport.receive_frame()?;
        hex_dump("ack", &ack);
        validate_response(&ack, opcode::ANSW_INF_OK)?;
        Ok(())
    }

    pub fn read_sw_version(&mut self) -> Result<BootloaderVersion> {
        let ack = self.exchange(
            build_command(opcode::RD_SW_VERSION, 0, 0, 0),
            opcode::ANSW_SW_VERSION,
        )?;
        Ok(BootloaderVersion {
            major: ack[4],
            minor: ack[5],
            patch: ack[6],
        })
    }

    pub fn read_page(&mut self, page: u8, count: usize) -> Result<Vec<u8>> {
        self.exchange(
            build_command(opcode::RD_FLASH_PAGE, page, 0, 0),
            opcode::ANSW_INF_OK,
        )?;
        let data = self.transport.receive(count * PAGE_SIZE)?;
        hex_dump("page", &data);
        Ok(data)
    }

    pub fn write_page(&mut self, page: u8, data: &[u8; PAGE_SIZE]) -> Result<()> {
        self.exchange(
            build_command(opcode::WR_FLASH_PAGE, page, 0, 0),
            opcode::ANSW_INF_OK,
        )?;
        self.transport.send(data)?;
        self.confirm()
    }

    /// Write a single byte at a flat flash address.
    pub fn write_byte(&mut self, address: u16, value: u8) -> Result<()> {
        let [page, offset] = address.to_be_bytes();
        debug!("write byte {:#06x} <- {:#04x}", address, value);
        self.exchange(
            build_command(opcode::WR_FLASH_BYTE, page, offset, value),
            opcode::ANSW_INF_OK,
        )?;
        Ok(())
    }

    /// Erase `pages` pages of program area, then stream `program` into it.
    pub fn write_program_area(&mut self, pages: u8, program: &[u8]) -> Result<()> {
        if program.len() != pages as usize * PAGE_SIZE {
            return Err(ProgramError::ProgramSizeMismatch {
                pages,
                size: program.len(),
            }
            .into());
        }
        self.exchange(
            build_command(opcode::WR_PRG_AREA, pages, 0, 0),
            opcode::ANSW_INF_OK,
        )?;
        self.transport.send(program)?;
        self.confirm()
    }

    pub fn read_program_area(&mut self, pages: u8) -> Result<Vec<u8>> {
        self.exchange(
            build_command(opcode::RD_PRG_AREA, pages, 0, 0),
            opcode::ANSW_INF_OK,
        )?;
        self.transport.receive(pages as usize * PAGE_SIZE)
    }

    /// Run the built-in self-test. The result code travels in the first
    /// payload byte of the acknowledgement, zero meaning success.
    pub fn run_self_test(&mut self) -> Result<()> {
        let ack = self.exchange(build_command(opcode::WR_BIST, 0, 0, 0), opcode::ANSW_INF_OK)?;
        match ack[4] {
            0 => Ok(()),
            code => Err(Error::SelfTestFailure(code)),
        }
    }

    pub fn read_info(&mut self) -> Result<ChipInfo> {
        let page = self.read_page(INFO_PAGE, 1)?;
        Ok(ChipInfo::from_page(&page))
    }

    /// Read the configuration page as stored on the module.
    pub fn read_config(&mut self) -> Result<ConfigImage> {
        let page = self.read_page(CONFIG_PAGE, 1)?;
        let mut raw = [0u8; PAGE_SIZE];
        raw.copy_from_slice(&page);
        Ok(ConfigImage::from(raw))
    }

    pub fn set_code_protect(&mut self) -> Result<()> {
        info!("Set codeprotect bit");
        self.write_byte(config_address(CODE_PROTECT_OFFSET), CODE_PROTECT_ON)
    }

    pub fn verify_code_protect(&mut self) -> Result<()> {
        info!("Verify codeprotect bit");
        let config = self.read_config()?;
        if config.code_protect() != CODE_PROTECT_ON {
            return Err(Error::CodeProtectVerifyFailure(config.code_protect()));
        }
        Ok(())
    }

    /// Read the configuration page back and compare it with `expected`.
    pub fn verify_config(&mut self, expected: &ConfigImage) -> Result<()> {
        let actual = self.read_page(CONFIG_PAGE, 1)?;
        match first_mismatch(expected.as_bytes(), &actual) {
            Some(offset) => Err(VerifyError::ConfigMismatch(offset).into()),
            None => Ok(()),
        }
    }

    /// Read `pages` pages of program area back and compare them with
    /// `expected`.
    pub fn verify_program(&mut self, pages: u8, expected: &[u8]) -> Result<()> {
        let actual = self.read_program_area(pages)?;
        match first_mismatch(expected, &actual) {
            Some(offset) => Err(VerifyError::ProgramMismatch(offset).into()),
            None => Ok(()),
        }
    }
}

/// Flat flash address of a byte in the configuration page.
pub fn config_address(offset: usize) -> u16 {
    (CONFIG_PAGE as u16) * (PAGE_SIZE as u16) + offset as u16
}

fn first_mismatch(expected: &[u8], actual: &[u8]) -> Option<usize> {
    let found = expected
        .iter()
        .zip(actual.iter())
        .position(|(e, a)| e != a);
    match found {
        Some(offset) => Some(offset),
        None if actual.len() < expected.len() => Some(actual.len()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ProtocolError;
    use crate::image::{CODE_PROTECT_OFF, FILL};
    use crate::link::sim::SimulatedModule;
    use crate::settings::{Settings, SettingsBuilder};

    fn fast_settings() -> Settings {
        SettingsBuilder::new()
            .ready_poll_interval(Duration::from_millis(0))
            .settle_delay(Duration::from_micros(0))
            .finalize()
    }

    fn with_flash<T>(module: &mut SimulatedModule, f: impl FnOnce(&mut FlashAccess) -> T) -> T {
        let settings = fast_settings();
        module.open().unwrap();
        let mut flash = FlashAccess::new(Transport::new(module, &settings));
        f(&mut flash)
    }

    fn program(pages: usize) -> Vec<u8> {
        (0..pages * PAGE_SIZE).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[test]
    fn reads_bootloader_version() {
        let mut module = SimulatedModule::new();
        let version = with_flash(&mut module, |flash| flash.read_sw_version()).unwrap();
        assert_eq!(version.to_string(), "2.1.0");
    }

    #[test]
    fn corrupted_version_ack_is_reported() {
        let mut module = SimulatedModule::new();
        module.bad_version_ack = true;
        let result = with_flash(&mut module, |flash| flash.read_sw_version());
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::ChecksumMismatch { .. }))
        ));
    }

    #[test]
    fn decodes_info_page() {
        let mut module = SimulatedModule::new();
        let info = with_flash(&mut module, |flash| flash.read_info()).unwrap();
        assert_eq!(info.lot_string(), "ABCD17");
        assert_eq!(info.id_hex(), "01020304");
        assert!(!info.locked);
    }

    #[test]
    fn lock_sentinel_marks_chip_locked() {
        let mut page = [0u8; PAGE_SIZE];
        page[LOCK_OFFSET] = LOCK_SENTINEL;
        assert!(ChipInfo::from_page(&page).locked);
    }

    #[test]
    fn page_write_reads_back_identical() {
        let mut module = SimulatedModule::new();
        let mut config = ConfigImage::blank();
        for offset in 0..PAGE_SIZE {
            config.set(offset, offset as u8);
        }
        with_flash(&mut module, |flash| {
            flash.write_page(CONFIG_PAGE, config.as_bytes())?;
            assert_eq!(flash.read_config()?, config);
            flash.verify_config(&config)
        })
        .unwrap();
    }

    #[test]
    fn verify_reports_corrupted_config_offset() {
        let mut module = SimulatedModule::new();
        module.corrupt_config_at = Some(0x2A);
        let config = ConfigImage::blank();
        let result = with_flash(&mut module, |flash| {
            flash.write_page(CONFIG_PAGE, config.as_bytes())?;
            flash.verify_config(&config)
        });
        assert!(matches!(
            result,
            Err(Error::Verify(VerifyError::ConfigMismatch(0x2A)))
        ));
    }

    #[test]
    fn write_byte_addresses_page_and_offset() {
        let mut module = SimulatedModule::new();
        with_flash(&mut module, |flash| flash.write_byte(config_address(3), 0x42)).unwrap();
        assert_eq!(module.config()[3], 0x42);
        assert_eq!(module.config()[2], FILL);
    }

    #[test]
    fn program_area_round_trip() {
        let mut module = SimulatedModule::new();
        let image = program(2);
        with_flash(&mut module, |flash| {
            flash.write_program_area(2, &image)?;
            flash.verify_program(2, &image)
        })
        .unwrap();
        assert_eq!(&module.page(1)[..], &image[PAGE_SIZE..]);
    }

    #[test]
    fn flipped_program_byte_is_located() {
        let mut module = SimulatedModule::new();
        let image = program(2);
        with_flash(&mut module, |flash| flash.write_program_area(2, &image)).unwrap();
        module.flash_mut()[300] ^= 0x01;
        let result = with_flash(&mut module, |flash| flash.verify_program(2, &image));
        assert!(matches!(
            result,
            Err(Error::Verify(VerifyError::ProgramMismatch(300)))
        ));
    }

    #[test]
    fn program_size_must_match_page_count() {
        let mut module = SimulatedModule::new();
        let image = program(2);
        let result = with_flash(&mut module, |flash| flash.write_program_area(3, &image));
        assert!(matches!(
            result,
            Err(Error::Program(ProgramError::ProgramSizeMismatch {
                pages: 3,
                size: 512
            }))
        ));
        // Nothing went over the wire.
        assert!(module.commands().is_empty());
    }

    #[test]
    fn self_test_result_must_be_zero() {
        let mut module = SimulatedModule::new();
        with_flash(&mut module, |flash| flash.run_self_test()).unwrap();

        let mut module = SimulatedModule::new();
        module.bist_result = 0x03;
        let result = with_flash(&mut module, |flash| flash.run_self_test());
        assert!(matches!(result, Err(Error::SelfTestFailure(0x03))));
    }

    #[test]
    fn code_protect_is_set_and_verified() {
        let mut module = SimulatedModule::new();
        with_flash(&mut module, |flash| {
            flash.set_code_protect()?;
            flash.verify_code_protect()
        })
        .unwrap();
        assert_eq!(module.config()[CODE_PROTECT_OFFSET], CODE_PROTECT_ON);
    }

    #[test]
    fn stuck_code_protect_fails_verification() {
        let mut module = SimulatedModule::new();
        module.protect_stuck = true;
        let result = with_flash(&mut module, |flash| {
            flash.set_code_protect()?;
            flash.verify_code_protect()
        });
        assert!(matches!(
            result,
            Err(Error::CodeProtectVerifyFailure(CODE_PROTECT_OFF))
        ));
    }

    #[test]
    fn mismatch_on_short_read() {
        assert_eq!(first_mismatch(&[1, 2, 3], &[1, 2]), Some(2));
        assert_eq!(first_mismatch(&[1, 2, 3], &[1, 2, 3]), None);
        assert_eq!(first_mismatch(&[1, 2, 3], &[0, 2, 3]), Some(0));
    }
}
