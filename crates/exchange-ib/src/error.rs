use thiserror::Error;

/// Failures at the gateway seam.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("contract {0} cannot be expressed for TWS: {1}")]
    InvalidContract(String, String),
    #[error("price {0} does not fit an f64")]
    InvalidPrice(rust_decimal::Decimal),
}
