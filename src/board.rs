/// Hardware abstraction for supported boards.
///
/// Each board module defines pin assignments and capabilities
/// selected at compile time via feature flags.

#[cfg(feature = "board-xiao")]
mod hw {
    pub const GPS_RX_PIN: u8 = 6; // D5 on the expansion header
    pub const GPS_TX_PIN: u8 = 5;
    pub const CANCEL_BUTTON_PIN: u8 = 0; // BOOT button, active low
    pub const HAS_SD_SLOT: bool = true; // Sense expansion board
    pub const SD_CS_PIN: u8 = 21;
    pub const SD_SCK_PIN: u8 = 7;
    pub const SD_MISO_PIN: u8 = 8;
    pub const SD_MOSI_PIN: u8 = 9;
    pub const HAS_DISPLAY: bool = false;
    pub const BOARD_NAME: &str = "xiao_esp32s3";
}

#[cfg(feature = "board-m5stickc")]
mod hw {
    pub const GPS_RX_PIN: u8 = 33; // Grove port
    pub const GPS_TX_PIN: u8 = 32;
    pub const CANCEL_BUTTON_PIN: u8 = 37; // Button A, active low
    pub const HAS_SD_SLOT: bool = false;
    pub const POWER_HOLD_PIN: u8 = 4;
    pub const HAS_DISPLAY: bool = true;
    pub const DISPLAY_MOSI_PIN: u8 = 15;
    pub const DISPLAY_CLK_PIN: u8 = 13;
    pub const DISPLAY_CS_PIN: u8 = 5;
    pub const DISPLAY_DC_PIN: u8 = 14;
    pub const DISPLAY_RST_PIN: u8 = 12;
    pub const DISPLAY_BL_PIN: u8 = 27;
    pub const DISPLAY_WIDTH: u16 = 135;
    pub const DISPLAY_HEIGHT: u16 = 240;
    pub const DISPLAY_SPI_FREQ_MHZ: u32 = 40;
    pub const BOARD_NAME: &str = "m5stickc_plus2";
}

#[cfg(not(any(feature = "board-xiao", feature = "board-m5stickc")))]
mod hw {
    pub const HAS_SD_SLOT: bool = false;
    pub const HAS_DISPLAY: bool = false;
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;

#[cfg(test)]
mod tests {
    #[allow(unused_imports)]
    use super::*;

    #[cfg(any(feature = "board-xiao", feature = "board-m5stickc"))]
    fn assert_distinct(pins: &[u8]) {
        for (i, a) in pins.iter().enumerate() {
            assert!(!pins[i + 1..].contains(a), "GPIO{} assigned twice", a);
        }
    }

    #[cfg(feature = "board-xiao")]
    #[test]
    fn xiao_pin_map_has_no_collisions() {
        assert!(HAS_SD_SLOT);
        assert_distinct(&[
            GPS_RX_PIN,
            GPS_TX_PIN,
            CANCEL_BUTTON_PIN,
            SD_CS_PIN,
            SD_SCK_PIN,
            SD_MISO_PIN,
            SD_MOSI_PIN,
        ]);
    }

    #[cfg(feature = "board-m5stickc")]
    #[test]
    fn m5stickc_pin_map_has_no_collisions() {
        assert!(!HAS_SD_SLOT);
        assert_distinct(&[
            GPS_RX_PIN,
            GPS_TX_PIN,
            CANCEL_BUTTON_PIN,
            POWER_HOLD_PIN,
            DISPLAY_MOSI_PIN,
            DISPLAY_CLK_PIN,
            DISPLAY_CS_PIN,
            DISPLAY_DC_PIN,
            DISPLAY_RST_PIN,
            DISPLAY_BL_PIN,
        ]);
    }

    #[test]
    fn board_name_is_set() {
        assert!(!BOARD_NAME.is_empty());
    }
}
