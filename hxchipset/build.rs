use std::{env, fs, path::PathBuf};

use serde::Deserialize;

#[derive(Deserialize)]
struct Board {
    bus: Bus,
    panel: Panel,
    touch: Touch,
    firmware: Firmware,
}

#[derive(Deserialize)]
struct Bus {
    i2c_addr: u8,
    retry_times: u32,
}

#[derive(Deserialize)]
struct Panel {
    x_max: u32,
    y_max: u32,
}

#[derive(Deserialize)]
struct Touch {
    rx_num: u8,
    tx_num: u8,
    bt_num: u8,
    max_pt: u8,
    xy_reverse: bool,
    int_is_edge: bool,
}

#[derive(Deserialize)]
struct Firmware {
    name: String,
}

fn main() {
    let path = env::var("HX_BOARD").unwrap_or_else(|_| "board.toml".into());
    println!("cargo:rerun-if-changed={path}");
    println!("cargo:rerun-if-env-changed=HX_BOARD");

    let text = fs::read_to_string(&path).unwrap_or_else(|e| panic!("read {path}: {e}"));
    let board: Board = toml::from_str(&text).unwrap_or_else(|e| panic!("parse {path}: {e}"));

    if board.touch.max_pt == 0 || board.panel.x_max == 0 || board.panel.y_max == 0 {
        panic!("{path}: max_pt and panel size must be non-zero");
    }
    if board.touch.max_pt > 24 {
        panic!("{path}: max_pt {} does not fit one event read", board.touch.max_pt);
    }

    let out = format!(
        "pub const I2C_ADDR: u8 = {:#04x};\n\
         pub const BUS_RETRY_TIMES: u32 = {};\n\
         pub const PANEL_X_MAX: u32 = {};\n\
         pub const PANEL_Y_MAX: u32 = {};\n\
         pub const FIX_RX_NUM: u8 = {};\n\
         pub const FIX_TX_NUM: u8 = {};\n\
         pub const FIX_BT_NUM: u8 = {};\n\
         pub const FIX_MAX_PT: u8 = {};\n\
         pub const FIX_XY_REVERSE: bool = {};\n\
         pub const FIX_INT_IS_EDGE: bool = {};\n\
         pub const FW_NAME: &str = {:?};\n",
        board.bus.i2c_addr,
        board.bus.retry_times,
        board.panel.x_max,
        board.panel.y_max,
        board.touch.rx_num,
        board.touch.tx_num,
        board.touch.bt_num,
        board.touch.max_pt,
        board.touch.xy_reverse,
        board.touch.int_is_edge,
        board.firmware.name,
    );

    let dest = PathBuf::from(env::var("OUT_DIR").unwrap()).join("board.rs");
    fs::write(dest, out).unwrap();
}
