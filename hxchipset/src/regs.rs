//! Bus commands and AHB register addresses of the HX8319x family.

// 总线命令
pub const CMD_AHB_ADDR: u8 = 0x00;
pub const CMD_AHB_RDATA: u8 = 0x08;
pub const CMD_AHB_ACCESS_DIR: u8 = 0x0C;
pub const CMD_AHB_CONTI: u8 = 0x13;
pub const CMD_AHB_INC4: u8 = 0x0D;
pub const CMD_EVENT_STACK: u8 = 0x30;
pub const CMD_SENSE_ON_OFF_0: u8 = 0x31;
pub const CMD_SENSE_ON_OFF_1: u8 = 0x32;

pub const PARA_AHB_ACCESS_DIR_READ: u8 = 0x00;
pub const PARA_AHB_CONTI: u8 = 0x31;
pub const PARA_AHB_INC4: u8 = 0x10;
pub const PARA_SENSE_OFF_0: u8 = 0x27;
pub const PARA_SENSE_OFF_1: u8 = 0x95;

// 系统寄存器
pub const ADDR_SYSTEM_RESET: u32 = 0x9000_0018;
pub const DATA_SYSTEM_RESET: u32 = 0x55;
pub const ADDR_CTRL_FW: u32 = 0x9000_005C;
pub const ADDR_CS_CENTRAL_STATE: u32 = 0x9000_00A8;
pub const ADDR_PSL: u32 = 0x9000_00A0;
pub const ADDR_OSC_EN: u32 = 0x9000_009C;
pub const ADDR_OSC_PW: u32 = 0x9000_0280;
pub const ADDR_ICID: u32 = 0x9000_00D0;
pub const ADDR_IC_CASCADE: u32 = 0x9000_00EC;
pub const ADDR_DBG_E4: u32 = 0x9000_00E4;
pub const ADDR_DBG_E8: u32 = 0x9000_00E8;
pub const CENTRAL_STATE_SAFE: u8 = 0x0C;
pub const FW_STOP_ACK: u8 = 0x87;
pub const FW_STOP_REQ: u8 = 0xA5;

// 固件寄存器
pub const ADDR_RAW_OUT_SEL: u32 = 0x1000_72EC;
pub const ADDR_RELOAD_CTRL: u32 = 0x1000_7F00;
pub const DATA_RELOAD_DISABLE: u32 = 0xA55A;
pub const ADDR_FW_STATUS: u32 = 0x1000_7F40;
pub const ADDR_SORTING_MODE: u32 = 0x1000_7F04;
pub const ADDR_FW_CID: u32 = 0x1000_7000;
pub const ADDR_FW_ARCH: u32 = 0x1000_7004;
pub const ADDR_FW_CUSTOMER: u32 = 0x1000_7008;
pub const ADDR_FW_PROJECT: u32 = 0x1000_7014;
pub const ADDR_FW_CONFIG_DATE: u32 = 0x1000_7038;
pub const ADDR_FW_CFG: u32 = 0x1000_7084;
pub const ADDR_FW_TRIGGER: u32 = 0x1000_7088;
pub const ADDR_FW_READY_ALT: u32 = 0x1000_72C0;
pub const ADDR_INFO_RXTX: u32 = 0x1000_70F4;
pub const ADDR_INFO_XY_REV: u32 = 0x1000_70F8;
pub const ADDR_INFO_ID_EN: u32 = 0x1000_7134;
pub const ADDR_INFO_BT_NUM: u32 = 0x1000_70E8;
pub const ADDR_SET_FRAME: u32 = 0x1000_7294;
pub const ADDR_RAWDATA: u32 = 0x1000_0000;
pub const SRAM_PASSWRD_START: u16 = 0x5AA5;
pub const SRAM_PASSWRD_END: u16 = 0xA55A;

// 硬件 CRC
pub const ADDR_CRC_START: u32 = 0x8005_0020;
pub const ADDR_CRC_LEN: u32 = 0x8005_0028;
pub const ADDR_CRC_STATUS: u32 = 0x8005_0000;
pub const ADDR_CRC_RESULT: u32 = 0x8005_0018;
pub const CRC_TRIGGER: u8 = 0x99;

// SPI200 闪存控制器
pub const SPI200_TRANS_FMT: u32 = 0x8000_0010;
pub const SPI200_TRANS_CTRL: u32 = 0x8000_0020;
pub const SPI200_CMD: u32 = 0x8000_0024;
pub const SPI200_ADDR: u32 = 0x8000_0028;
pub const SPI200_DATA: u32 = 0x8000_002C;
pub const SPI200_FIFO_RST: u32 = 0x8000_0030;
pub const SPI200_RST_STATUS: u32 = 0x8000_0034;
pub const SPI200_FLASH_SPEED: u32 = 0x8000_0040;

pub const SPI200_FMT: u32 = 0x0002_0780;
pub const SPI200_TXFIFO_RST: u32 = 0x04;
pub const SPI200_RXFIFO_RST: u32 = 0x02;
pub const SPI200_CTRL_READ_STATUS: u32 = 0x4200_0003;
pub const SPI200_CTRL_WRITE_EN: u32 = 0x4700_0000;
pub const SPI200_CTRL_ADDR_CMD: u32 = 0x6700_0000;
pub const SPI200_CTRL_PAGE_PROG: u32 = 0x610F_F000;
pub const SPI200_CTRL_READ_REG: u32 = 0x4200_0000;
pub const SPI200_CTRL_WRITE_REG: u32 = 0x4100_0000;
pub const SPI200_CTRL_READ_ID: u32 = 0x4200_0002;
pub const SPI200_CTRL_FAST_READ: u32 = 0x6940_020F;

pub const FLASH_CMD_WRSR: u32 = 0x01;
pub const FLASH_CMD_PP: u32 = 0x02;
pub const FLASH_CMD_SPEED: u32 = 0x03;
pub const FLASH_CMD_RDSR: u32 = 0x05;
pub const FLASH_CMD_WREN: u32 = 0x06;
pub const FLASH_CMD_SE: u32 = 0x20;
pub const FLASH_CMD_FAST_READ: u32 = 0x3B;
pub const FLASH_CMD_RDID: u32 = 0x9F;
pub const FLASH_CMD_CE: u32 = 0xC7;
pub const FLASH_CMD_BE: u32 = 0xD8;

// 写保护 GPIO
pub const ADDR_WP_GPIO_OUT: u32 = 0x9002_8000;
pub const ADDR_WP_GPIO_DIR: u32 = 0x9002_8004;
pub const ADDR_WP_GPIO_LEVEL: u32 = 0x9002_801C;

// 显示驱动寄存器窗口
pub const DD_REG_BASE: u8 = 0x30;
