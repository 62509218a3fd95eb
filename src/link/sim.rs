//! In-memory module emulating the bootloader, used by the unit tests.

use std::collections::VecDeque;
use std::io;

use super::Link;
use crate::error::LinkError;
use crate::image::{CONFIG_PAGE, INFO_PAGE, PAGE_SIZE};
use crate::protocol::frame::{build_command, checksum, opcode, Frame, FRAME_SIZE};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum PinEvent {
    ProgramEnable(bool),
    Reset(bool),
    Open,
    Close,
}

#[derive(Debug)]
enum Expect {
    Command,
    Page(u8),
    Program(usize),
}

pub(crate) struct SimulatedModule {
    flash: Vec<u8>,
    open: bool,
    absent: bool,
    not_ready: usize,
    stall: Option<(u8, usize)>,
    ready_polls: usize,
    inbound: Vec<u8>,
    outbound: VecDeque<u8>,
    expect: Expect,
    chunk_sizes: Vec<usize>,
    pins: Vec<PinEvent>,
    commands: Vec<u8>,
    pub(crate) sw_version: [u8; 3],
    pub(crate) bist_result: u8,
    pub(crate) protect_stuck: bool,
    pub(crate) corrupt_program_at: Option<usize>,
    pub(crate) corrupt_config_at: Option<usize>,
    pub(crate) bad_version_ack: bool,
}

impl SimulatedModule {
    /// A module with an erased flash, except for an info page carrying the
    /// lot `ABCD` 0x17 and the module id `01 02 03 04`.
    pub(crate) fn new() -> Self {
        let mut flash = vec![0xFF; (INFO_PAGE as usize + 1) * PAGE_SIZE];
        let info = INFO_PAGE as usize * PAGE_SIZE;
        flash[info + 2..info + 7].copy_from_slice(&[b'A', b'B', b'C', b'D', 0x17]);
        flash[info + 64..info + 68].copy_from_slice(&[0x01, 0x02, 0x03, 0x04]);
        flash[info + 255] = 0x00;
        SimulatedModule {
            flash,
            open: false,
            absent: false,
            not_ready: 0,
            stall: None,
            ready_polls: 0,
            inbound: Vec::new(),
            outbound: VecDeque::new(),
            expect: Expect::Command,
            chunk_sizes: Vec::new(),
            pins: Vec::new(),
            commands: Vec::new(),
            sw_version: [2, 1, 0],
            bist_result: 0,
            protect_stuck: false,
            corrupt_program_at: None,
            corrupt_config_at: None,
            bad_version_ack: false,
        }
    }

    /// A module that never raises its readiness line.
    pub(crate) fn absent() -> Self {
        let mut module = Self::new();
        module.absent = true;
        module
    }

    pub(crate) fn not_ready_for(&mut self, polls: usize) {
        self.not_ready = polls;
    }

    /// Drop the readiness line for `polls` polls once a command with
    /// `opcode` has been received.
    pub(crate) fn stall_after(&mut self, opcode: u8, polls: usize) {
        self.stall = Some((opcode, polls));
    }

    pub(crate) fn ready_polls(&self) -> usize {
        self.ready_polls
    }

    pub(crate) fn chunk_sizes(&self) -> Vec<usize> {
        self.chunk_sizes.clone()
    }

    pub(crate) fn pins(&self) -> &[PinEvent] {
        &self.pins
    }

    /// Opcodes of every command received so far.
    pub(crate) fn commands(&self) -> &[u8] {
        &self.commands
    }

    pub(crate) fn page(&self, page: u8) -> &[u8] {
        let start = page as usize * PAGE_SIZE;
        &self.flash[start..start + PAGE_SIZE]
    }

    pub(crate) fn set_page(&mut self, page: u8, data: &[u8]) {
        let start = page as usize * PAGE_SIZE;
        self.flash[start..start + PAGE_SIZE].copy_from_slice(data);
    }

    pub(crate) fn config(&self) -> &[u8] {
        self.page(CONFIG_PAGE)
    }

    pub(crate) fn flash_mut(&mut self) -> &mut [u8] {
        &mut self.flash
    }

    fn ack(&mut self, ack: u8, arg0: u8, arg1: u8, arg2: u8) {
        self.outbound.extend(build_command(ack, arg0, arg1, arg2).iter());
    }

    fn process(&mut self) {
        loop {
            match self.expect {
                Expect::Command if self.inbound.len() >= FRAME_SIZE => {
                    let mut frame = [0u8; FRAME_SIZE];
                    frame.copy_from_slice(&self.inbound[..FRAME_SIZE]);
                    self.inbound.drain(..FRAME_SIZE);
                    self.command(frame);
                }
                Expect::Page(page) if self.inbound.len() >= PAGE_SIZE => {
                    let data: Vec<u8> = self.inbound.drain(..PAGE_SIZE).collect();
                    self.set_page(page, &data);
                    if page == CONFIG_PAGE {
                        if let Some(offset) = self.corrupt_config_at {
                            self.flash[CONFIG_PAGE as usize * PAGE_SIZE + offset] ^= 0xFF;
                        }
                    }
                    self.expect = Expect::Command;
                    self.ack(opcode::ANSW_INF_OK, 0, 0, 0);
                }
                Expect::Program(size) if self.inbound.len() >= size => {
                    let data: Vec<u8> = self.inbound.drain(..size).collect();
                    self.flash[..size].copy_from_slice(&data);
                    if let Some(offset) = self.corrupt_program_at {
                        self.flash[offset] ^= 0xFF;
                    }
                    self.expect = Expect::Command;
                    self.ack(opcode::ANSW_INF_OK, 0, 0, 0);
                }
                _ => return,
            }
        }
    }

    fn command(&mut self, frame: Frame) {
        assert_eq!(frame[..3], [0xA5, 0x5A, 0xA5], "bad sync in {:02X?}", frame);
        assert_eq!(frame[7], checksum(&frame), "bad checksum in {:02X?}", frame);
        self.commands.push(frame[3]);
        if let Some((op, polls)) = self.stall {
            if op == frame[3] {
                self.not_ready = polls;
                self.stall = None;
            }
        }

        let [_, _, _, op, arg0, arg1, arg2, _] = frame;
        match op {
            opcode::RD_SW_VERSION => {
                let [major, minor, patch] = self.sw_version;
                if self.bad_version_ack {
                    let mut ack = build_command(opcode::ANSW_SW_VERSION, major, minor, patch);
                    ack[7] ^= 0x01;
                    self.outbound.extend(ack.iter());
                } else {
                    self.ack(opcode::ANSW_SW_VERSION, major, minor, patch);
                }
            }
            opcode::RD_FLASH_PAGE => {
                self.ack(opcode::ANSW_INF_OK, 0, 0, 0);
                let page = self.page(arg0).to_vec();
                self.outbound.extend(page);
            }
            opcode::WR_FLASH_PAGE => {
                self.ack(opcode::ANSW_INF_OK, 0, 0, 0);
                self.expect = Expect::Page(arg0);
            }
            opcode::WR_FLASH_BYTE => {
                let address = arg0 as usize * PAGE_SIZE + arg1 as usize;
                let protect = CONFIG_PAGE as usize * PAGE_SIZE + 1;
                if !(self.protect_stuck && address == protect) {
                    self.flash[address] = arg2;
                }
                self.ack(opcode::ANSW_INF_OK, 0, 0, 0);
            }
            opcode::WR_PRG_AREA => {
                let size = arg0 as usize * PAGE_SIZE;
                for byte in &mut self.flash[..size] {
                    *byte = 0xFF;
                }
                self.ack(opcode::ANSW_INF_OK, 0, 0, 0);
                self.expect = Expect::Program(size);
            }
            opcode::RD_PRG_AREA => {
                self.ack(opcode::ANSW_INF_OK, 0, 0, 0);
                let size = arg0 as usize * PAGE_SIZE;
                let data = self.flash[..size].to_vec();
                self.outbound.extend(data);
            }
            opcode::WR_BIST => {
                let result = self.bist_result;
                self.ack(opcode::ANSW_INF_OK, result, 0, 0);
            }
            other => panic!("unknown opcode {:#04x}", other),
        }
    }
}

impl Link for SimulatedModule {
    fn set_program_enable(&mut self, asserted: bool) -> Result<(), LinkError> {
        self.pins.push(PinEvent::ProgramEnable(asserted));
        Ok(())
    }

    fn set_reset(&mut self, high: bool) -> Result<(), LinkError> {
        self.pins.push(PinEvent::Reset(high));
        Ok(())
    }

    fn open(&mut self) -> Result<(), LinkError> {
        self.pins.push(PinEvent::Open);
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), LinkError> {
        if self.open {
            self.pins.push(PinEvent::Close);
            self.open = false;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn is_ready(&mut self) -> Result<bool, LinkError> {
        self.ready_polls += 1;
        if self.absent {
            return Ok(false);
        }
        if self.not_ready > 0 {
            self.not_ready -= 1;
            return Ok(false);
        }
        Ok(true)
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), LinkError> {
        if !self.open {
            return Err(LinkError::NotOpen);
        }
        self.chunk_sizes.push(chunk.len());
        self.inbound.extend_from_slice(chunk);
        self.process();
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), LinkError> {
        if !self.open {
            return Err(LinkError::NotOpen);
        }
        if self.outbound.len() < buf.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "nothing to read").into());
        }
        for byte in buf.iter_mut() {
            *byte = self.outbound.pop_front().unwrap_or(0);
        }
        Ok(())
    }
}
