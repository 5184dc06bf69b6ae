use rdrive::KError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum HxError {
    #[error("bus transfer failed")]
    Bus,
    #[error("transfer length {0} over limit")]
    Length(usize),
    #[error("register {0:#010x} read back mismatch")]
    RegMismatch(u32),
    #[error("timeout waiting for {0}")]
    Timeout(&'static str),
    #[error("data checksum mismatch")]
    Checksum,
    #[error("hardware crc result {0:#010x}")]
    Crc(u32),
    #[error("flash write protect could not be changed")]
    WriteProtect,
    #[error("bad firmware image: {0}")]
    Image(&'static str),
    #[error("unknown chip id {0:02x?}")]
    UnknownChip([u8; 4]),
    #[error("invalid argument `{0}`")]
    InvalidArg(&'static str),
    #[error("device busy")]
    Busy,
}

// 错误映射函数
pub fn map_hx_error_to_kerror(err: HxError) -> KError {
    match err {
        HxError::Bus | HxError::RegMismatch(_) | HxError::Timeout(_) => KError::Io,
        HxError::Length(_) => KError::InvalidArg { name: "length" },
        HxError::InvalidArg(name) => KError::InvalidArg { name },
        HxError::Image(_) => KError::InvalidArg { name: "firmware" },
        HxError::Busy => KError::Busy,
        HxError::Checksum | HxError::Crc(_) => KError::Unknown("checksum"),
        HxError::WriteProtect => KError::Unknown("write protect"),
        HxError::UnknownChip(_) => KError::Unknown("chip id"),
    }
}
