use rdrive::KError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum PvtpllError {
    #[error("no pvtpll registered for clock {0}")]
    NoDevice(u32),
    #[error("register {0:#x} access failed")]
    Reg(u32),
    #[error("invalid argument `{0}`")]
    InvalidArg(&'static str),
}

// 错误映射函数
pub fn map_pvtpll_error_to_kerror(err: PvtpllError) -> KError {
    match err {
        PvtpllError::NoDevice(_) => KError::Unknown("no pvtpll device"),
        PvtpllError::Reg(_) => KError::Io,
        PvtpllError::InvalidArg(name) => KError::InvalidArg { name },
    }
}
