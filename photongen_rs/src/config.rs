//! Generation options: debug/compression levels and target configuration
//! key-value options.

use std::collections::HashMap;

/// Levels above this are clamped.
pub const MAX_LEVEL: u8 = 5;

/// Pointer width (bits) assumed when `target_pointer_width` is not set.
pub const DEFAULT_POINTER_WIDTH: u64 = 32;

#[derive(Debug, Clone, Default)]
pub struct Config {
    debug_level: u8,
    compression_level: u8,
    options: HashMap<String, Option<String>>,
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    pub fn set_debug_level(&mut self, level: u8) {
        self.debug_level = level.min(MAX_LEVEL);
    }

    pub fn debug_level(&self) -> u8 {
        self.debug_level
    }

    pub fn set_compression_level(&mut self, level: u8) {
        self.compression_level = level.min(MAX_LEVEL);
    }

    pub fn compression_level(&self) -> u8 {
        self.compression_level
    }

    pub fn set_option(&mut self, key: impl Into<String>, value: Option<String>) {
        self.options.insert(key.into(), value);
    }

    pub fn is_option_defined(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key)?.as_deref()
    }

    /// Target pointer width in bits.
    pub fn pointer_width(&self) -> u64 {
        self.option("target_pointer_width")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_POINTER_WIDTH)
    }

    /// Target pointer width in bytes, as used by size computations.
    pub fn pointer_width_bytes(&self) -> u64 {
        self.pointer_width() / 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_clamp_to_five() {
        let mut cfg = Config::new();
        cfg.set_debug_level(9);
        cfg.set_compression_level(200);
        assert_eq!(cfg.debug_level(), 5);
        assert_eq!(cfg.compression_level(), 5);
    }

    #[test]
    fn pointer_width_defaults_to_32() {
        let mut cfg = Config::new();
        assert_eq!(cfg.pointer_width(), 32);
        assert_eq!(cfg.pointer_width_bytes(), 4);
        cfg.set_option("target_pointer_width", Some("64".into()));
        assert_eq!(cfg.pointer_width_bytes(), 8);
    }
}
