// Copyright (c) 2025 Robin Edwards
//
// MIT License

//! Cartridge mapper families and how files map onto them.

/// Every banking scheme the firmware can present on the bus.
///
/// A value of this type is what the loader hands back; activation picks the
/// matching emulation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperKind {
    Std8k,
    Std16k,
    Xegs32k,
    Xegs64k,
    Xegs128k,
    SwXegs32k,
    SwXegs64k,
    SwXegs128k,
    Megacart16k,
    Megacart32k,
    Megacart64k,
    Megacart128k,
    BountyBob,
    Atarimax1Mbit,
    /// Covers both the 32 KiB and 64 KiB Williams boards.
    Williams64k,
    Oss16kTypeB,
    Oss8k,
    Oss16k034M,
    Oss16k043M,
    Sic128k,
    Sdx64k,
    Sdx128k,
    Diamond64k,
    Express64k,
    Blizzard16k,
    Std4k,
    Turbosoft64k,
    Turbosoft128k,
    Atrax128k,
    Microcalc,
    Std2k,
    Phoenix8k,
    Blizzard4k,
    Adawliah32k,
    /// An ATR disk image was selected; activation mounts it instead of
    /// taking over the bus.
    Atr,
    /// An XEX executable was loaded; served by the paging feeder.
    Xex,
}

impl MapperKind {
    /// Decode byte 7 of a CAR header into a mapper and the exact body size
    /// that type requires.
    pub fn from_car_type(car_type: u8) -> Option<(Self, usize)> {
        Some(match car_type {
            1 => (Self::Std8k, 8192),
            2 => (Self::Std16k, 16384),
            3 => (Self::Oss16k034M, 16384),
            8 => (Self::Williams64k, 65536),
            9 => (Self::Express64k, 65536),
            10 => (Self::Diamond64k, 65536),
            11 => (Self::Sdx64k, 65536),
            12 => (Self::Xegs32k, 32768),
            13 => (Self::Xegs64k, 65536),
            14 => (Self::Xegs128k, 131072),
            15 => (Self::Oss16kTypeB, 16384),
            17 => (Self::Atrax128k, 131072),
            18 => (Self::BountyBob, 40960),
            22 => (Self::Williams64k, 32768),
            26 => (Self::Megacart16k, 16384),
            27 => (Self::Megacart32k, 32768),
            28 => (Self::Megacart64k, 65536),
            29 => (Self::Megacart128k, 131072),
            33 => (Self::SwXegs32k, 32768),
            34 => (Self::SwXegs64k, 65536),
            35 => (Self::SwXegs128k, 131072),
            39 => (Self::Phoenix8k, 8192),
            40 => (Self::Blizzard16k, 16384),
            41 => (Self::Atarimax1Mbit, 131072),
            43 => (Self::Sdx128k, 131072),
            44 => (Self::Oss8k, 8192),
            45 => (Self::Oss16k043M, 16384),
            46 => (Self::Blizzard4k, 4096),
            50 => (Self::Turbosoft64k, 65536),
            51 => (Self::Turbosoft128k, 131072),
            52 => (Self::Microcalc, 32768),
            54 => (Self::Sic128k, 131072),
            57 => (Self::Std2k, 2048),
            58 => (Self::Std4k, 4096),
            69 => (Self::Adawliah32k, 32768),
            _ => return None,
        })
    }

    /// Guess a mapper for a raw ROM dump from its size alone.
    pub fn from_rom_size(size: usize) -> Option<Self> {
        Some(match size {
            0x2000 => Self::Std8k,
            0x4000 => Self::Std16k,
            0x8000 => Self::Xegs32k,
            0x10000 => Self::Xegs64k,
            0x20000 => Self::Xegs128k,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn car_table_spot_checks() {
        assert_eq!(MapperKind::from_car_type(12), Some((MapperKind::Xegs32k, 32768)));
        assert_eq!(MapperKind::from_car_type(18), Some((MapperKind::BountyBob, 40960)));
        assert_eq!(MapperKind::from_car_type(69), Some((MapperKind::Adawliah32k, 32768)));
        assert_eq!(MapperKind::from_car_type(4), None);
        assert_eq!(MapperKind::from_car_type(0), None);
    }

    #[test]
    fn rom_size_guesses() {
        assert_eq!(MapperKind::from_rom_size(8 * 1024), Some(MapperKind::Std8k));
        assert_eq!(MapperKind::from_rom_size(128 * 1024), Some(MapperKind::Xegs128k));
        assert_eq!(MapperKind::from_rom_size(12 * 1024), None);
    }
}
