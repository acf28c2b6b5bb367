use std::fs;
use std::path::Path;

use log::warn;
use thiserror::Error;

/// Fixed 4-byte tag at the start of every ROM container.
pub const MAGIC: [u8; 4] = *b"MR8C";

/// The only container version this loader understands.
pub const VERSION: u8 = 1;

/// Header length; the payload starts right after.
pub const HEADER_LEN: usize = 12;

/// Structural problems abort the load; size and checksum drift are only
/// warned about so old tools can keep producing loadable images.
#[derive(Debug, Error)]
pub enum RomError {
    #[error("cannot read ROM: {0}")]
    Io(#[from] std::io::Error),
    #[error("ROM too small: {0} bytes, need at least {HEADER_LEN}")]
    TooShort(usize),
    #[error("bad magic {0:02X?}")]
    BadMagic([u8; 4]),
    #[error("unsupported ROM version {0}")]
    UnsupportedVersion(u8),
}

/// A parsed ROM image: the load address and the raw payload the host
/// copies into memory before starting the engine.
#[derive(Debug, Clone)]
pub struct Rom {
    pub origin: u16,
    pub data: Vec<u8>,
}

impl Rom {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RomError> {
        let bytes = fs::read(path)?;
        Self::parse(&bytes)
    }

    /// Validate the container header and split off the payload.
    ///
    /// Layout (little-endian): magic at 0..4, version at 4, origin at
    /// 5..7, declared payload size at 7..9, additive checksum at 9..11,
    /// one reserved byte, then the payload.
    pub fn parse(bytes: &[u8]) -> Result<Self, RomError> {
        if bytes.len() < HEADER_LEN {
            return Err(RomError::TooShort(bytes.len()));
        }
        if bytes[0..4] != MAGIC {
            let mut magic = [0u8; 4];
            magic.copy_from_slice(&bytes[0..4]);
            return Err(RomError::BadMagic(magic));
        }
        if bytes[4] != VERSION {
            return Err(RomError::UnsupportedVersion(bytes[4]));
        }

        let origin = u16::from_le_bytes([bytes[5], bytes[6]]);
        let declared_size = u16::from_le_bytes([bytes[7], bytes[8]]);
        let checksum = u16::from_le_bytes([bytes[9], bytes[10]]);

        let data = bytes[HEADER_LEN..].to_vec();

        if data.len() != usize::from(declared_size) {
            warn!(
                "ROM size mismatch: header declares {} bytes, payload is {}",
                declared_size,
                data.len()
            );
        }
        let calculated = Self::checksum(&data);
        if calculated != checksum {
            warn!(
                "ROM checksum mismatch: header 0x{:04X}, calculated 0x{:04X}",
                checksum, calculated
            );
        }

        Ok(Rom { origin, data })
    }

    /// Additive checksum: sum of all payload bytes mod 65536.
    pub fn checksum(data: &[u8]) -> u16 {
        data.iter()
            .fold(0u16, |sum, &byte| sum.wrapping_add(u16::from(byte)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Cpu;

    fn make_rom(origin: u16, payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(&MAGIC);
        bytes.push(VERSION);
        bytes.extend_from_slice(&origin.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&Rom::checksum(payload).to_le_bytes());
        bytes.push(0); // reserved
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn parses_well_formed_rom() {
        let bytes = make_rom(0x0300, &[0x01, 0x02, 0x03]);
        let rom = Rom::parse(&bytes).unwrap();
        assert_eq!(rom.origin, 0x0300);
        assert_eq!(rom.data, vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn short_file_is_fatal() {
        let err = Rom::parse(&[0x4D, 0x52]).unwrap_err();
        assert!(matches!(err, RomError::TooShort(2)));
    }

    #[test]
    fn truncated_header_is_fatal_before_field_checks() {
        // 11 bytes of garbage: must fail on length, not on magic.
        let err = Rom::parse(&[0xFF; 11]).unwrap_err();
        assert!(matches!(err, RomError::TooShort(11)));
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut bytes = make_rom(0x0000, &[]);
        bytes[0] = b'X';
        let err = Rom::parse(&bytes).unwrap_err();
        assert!(matches!(err, RomError::BadMagic(_)));
    }

    #[test]
    fn unsupported_version_is_fatal() {
        let mut bytes = make_rom(0x0000, &[]);
        bytes[4] = 2;
        let err = Rom::parse(&bytes).unwrap_err();
        assert!(matches!(err, RomError::UnsupportedVersion(2)));
    }

    #[test]
    fn size_mismatch_is_advisory() {
        let mut bytes = make_rom(0x0100, &[0xAA, 0xBB]);
        bytes[7] = 99; // declared size no longer matches
        let rom = Rom::parse(&bytes).unwrap();
        assert_eq!(rom.data, vec![0xAA, 0xBB]);
    }

    #[test]
    fn checksum_mismatch_is_advisory() {
        let mut bytes = make_rom(0x0100, &[0xAA, 0xBB]);
        bytes[9] ^= 0xFF;
        let rom = Rom::parse(&bytes).unwrap();
        assert_eq!(rom.data, vec![0xAA, 0xBB]);
    }

    #[test]
    fn checksum_wraps_modulo_65536() {
        let payload = vec![0xFF; 0x400];
        assert_eq!(Rom::checksum(&payload), (0xFFu32 * 0x400 % 0x10000) as u16);
    }

    #[test]
    fn halt_rom_end_to_end() {
        // Origin 0x0300, payload [HALT, 0, 0, 0], checksum 255. One step
        // after reset must halt with PC just past the opcode.
        let bytes = make_rom(0x0300, &[0xFF, 0x00, 0x00, 0x00]);
        let rom = Rom::parse(&bytes).unwrap();
        assert_eq!(Rom::checksum(&rom.data), 255);

        let mut cpu = Cpu::new();
        cpu.load(&rom.data, rom.origin);
        cpu.reset(rom.origin);
        cpu.step();
        assert!(cpu.halted);
        assert_eq!(cpu.pc, 0x0301);
    }
}
