use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("spi error: {0}")]
    Spi(String),
    #[error("optical-flow sensor timeout")]
    Timeout,
    #[error("unexpected optical-flow product id 0x{found:02x} (inverse 0x{inverse:02x})")]
    ProductId { found: u8, inverse: u8 },
    #[error("simulated fault: {0}")]
    Simulated(&'static str),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
