/// Hardware abstraction for supported boards.
///
/// Each board module defines the mode-select button polarity and the board
/// name, selected at compile time via feature flags. Pins are claimed in the
/// firmware binary, which owns the peripherals.

#[cfg(feature = "board-xiao")]
mod hw {
    /// BOOT button (GPIO0)
    pub const BUTTON_ACTIVE_LOW: bool = true;
    pub const BOARD_NAME: &str = "xiao_esp32s3";
}

#[cfg(feature = "board-m5stickc")]
mod hw {
    /// Front button A (GPIO37)
    pub const BUTTON_ACTIVE_LOW: bool = true;
    pub const BOARD_NAME: &str = "m5stickc_plus2";
}

#[cfg(not(any(feature = "board-xiao", feature = "board-m5stickc")))]
mod hw {
    pub const BUTTON_ACTIVE_LOW: bool = true;
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_name_matches_features() {
        let expected = if cfg!(feature = "board-xiao") {
            "xiao_esp32s3"
        } else if cfg!(feature = "board-m5stickc") {
            "m5stickc_plus2"
        } else {
            "unknown"
        };
        assert_eq!(BOARD_NAME, expected);
    }

    #[test]
    fn mode_buttons_are_active_low() {
        assert!(BUTTON_ACTIVE_LOW);
    }
}
