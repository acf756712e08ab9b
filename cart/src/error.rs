// Copyright (c) 2025 Robin Edwards
//
// MIT License

use core::fmt;

/// Failures on the menu path.
///
/// Each carries the fixed message the menu ROM prints; the dispatcher copies
/// it into the command-channel bank after an error status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuError {
    /// The FAT volume would not mount.
    NoMedia,
    /// The chosen file would not open.
    OpenFailed,
    /// A read failed part-way through.
    ReadFailed,
    /// A `.CAR` file too short to hold its own header.
    BadCarHeader,
    /// CAR type byte outside the supported table.
    UnsupportedCarType,
    /// CAR body size did not match its type.
    WrongCarSize,
    /// More than 128 KiB of payload.
    TooBig,
    /// Raw ROM dump of a size no known board uses.
    UnsupportedRomSize,
    /// The directory would not open.
    ReadDirFailed,
    /// Recursive search failed somewhere below the current directory.
    SearchFailed,
}

impl MenuError {
    /// Message shown on the Atari, NUL-terminated by the dispatcher.
    pub fn message(&self) -> &'static str {
        match self {
            Self::NoMedia => "Can't read flash memory",
            Self::OpenFailed => "Can't open file",
            Self::ReadFailed => "Can't read file",
            Self::BadCarHeader => "Bad CAR file",
            Self::UnsupportedCarType => "Unsupported CAR type",
            Self::WrongCarSize => "CAR file is wrong size",
            Self::TooBig => "Cart file/XEX too big (>128k)",
            Self::UnsupportedRomSize => "Unsupported ROM size",
            Self::ReadDirFailed => "Can't read directory",
            Self::SearchFailed => "Problem searching flash",
        }
    }
}

impl fmt::Display for MenuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
