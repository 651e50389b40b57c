//! Protocol constants
//!
//! Framing limits, operation bits, command ids and device error codes used by
//! the MICON v2 UART protocol.

// ============================================================================
// Framing
// ============================================================================

/// Operation bit for a read request.
pub const OP_READ: u8 = 0x80;
/// Operation bit for a write request.
pub const OP_WRITE: u8 = 0x00;
/// Mask selecting the operation bit of the first frame byte.
pub const OP_MASK: u8 = 0x80;
/// Mask selecting the payload length of the first frame byte.
pub const LEN_MASK: u8 = 0x7f;

/// Maximum payload length of a single frame.
pub const MAX_PAYLOAD_LEN: usize = 32;
/// Header (op/len + cmd) plus trailing checksum.
pub const FRAME_OVERHEAD: usize = 3;
/// Size of the receive accumulation buffer. Input beyond this is malformed.
pub const MAX_RX_LEN: usize = 40;

// ============================================================================
// Command ids (host → MCU)
// ============================================================================

/// End the MCU boot state and enable its interrupt line.
pub const CMD_BOOT_END: u8 = 0x03;
/// Power off.
pub const CMD_PWR_OFF: u8 = 0x06;
/// Wait for shutdown.
pub const CMD_SHUTDOWN_WAIT: u8 = 0x0c;
/// Cancel a pending shutdown.
pub const CMD_SHUTDOWN_CANCEL: u8 = 0x0d;
/// Reboot.
pub const CMD_REBOOT: u8 = 0x0e;
/// Put the serial line into console mode.
pub const CMD_SERMOD_CON: u8 = 0x0f;
/// Fan control mode.
pub const CMD_FAN_CTRL: u8 = 0x33;
/// System watchdog timeout.
pub const CMD_SYSTEM_WDT: u8 = 0x35;
/// Interrupt switch status (pressed keys, active low).
pub const CMD_INT_SW_STAT: u8 = 0x36;
/// Temperature.
pub const CMD_TEMP: u8 = 0x37;
/// Fan speed.
pub const CMD_FAN_SPEED: u8 = 0x38;
/// LED brightness.
pub const CMD_LED_BRIGHT: u8 = 0x3a;
/// Power state recorded at the last shutdown.
pub const CMD_PWR_STATE: u8 = 0x46;
/// Model and firmware version string.
pub const CMD_GET_VER: u8 = 0x83;

// ============================================================================
// Power states (CMD_PWR_STATE)
// ============================================================================

/// First boot after AC power was applied.
pub const PWR_STAT_COLD_BOOT: u8 = 2;
/// Running, or forcibly turned off with the power button.
pub const PWR_STAT_RUNNING: u8 = 3;
/// Restarting.
pub const PWR_STAT_RESTART: u8 = 4;
/// Turned off by a normal shutdown.
pub const PWR_STAT_POWER_OFF: u8 = 5;

// ============================================================================
// Device error codes (MCU → host, one-byte payload)
// ============================================================================

/// UART buffer overrun on the MCU side.
pub const ERR_CODE_UART_OVERRUN: u8 = 0xf1;
/// UART framing error on the MCU side.
pub const ERR_CODE_UART_FRAMING: u8 = 0xf2;
/// UART parity error on the MCU side.
pub const ERR_CODE_UART_PARITY: u8 = 0xf3;
/// The command is not available.
pub const ERR_CODE_UNAVAILABLE_CMD: u8 = 0xf4;
/// Payload length does not fit the command.
pub const ERR_CODE_INVALID_LEN: u8 = 0xf5;
/// Payload longer than 32 bytes.
pub const ERR_CODE_DATA_OVERFLOW: u8 = 0xf6;
/// Checksum of the request did not verify.
pub const ERR_CODE_INVALID_CHECKSUM: u8 = 0xf7;
