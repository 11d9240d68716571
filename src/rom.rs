//! ROM loading for CHIP-8 programs.
//!
//! A ROM is a raw binary file. There is no header and no container format:
//! the bytes are copied verbatim into machine memory at 0x200.

use std::path::Path;
use thiserror::Error;

/// A loaded ROM.
#[derive(Debug, Clone)]
pub struct RomFile {
    /// The raw program bytes.
    pub bytes: Vec<u8>,
}

impl RomFile {
    /// Create a new empty ROM.
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Get the size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Default for RomFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Load a ROM file from disk.
pub fn load_rom<P: AsRef<Path>>(path: P) -> Result<RomFile, RomError> {
    let bytes = std::fs::read(path.as_ref()).map_err(|e| RomError::IoError(e.to_string()))?;

    Ok(RomFile { bytes })
}

/// Errors that can occur while loading a ROM.
#[derive(Debug, Clone, Error)]
pub enum RomError {
    #[error("I/O error: {0}")]
    IoError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_rom() {
        let rom = RomFile::new();
        assert_eq!(rom.len(), 0);
        assert!(rom.is_empty());
    }

    #[test]
    fn test_load_missing_rom_fails() {
        let result = load_rom("/nonexistent/program.ch8");
        assert!(matches!(result, Err(RomError::IoError(_))));
    }
}
