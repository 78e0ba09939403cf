//! Built-in factors registered by [`FactorRegistry::with_defaults`](crate::FactorRegistry::with_defaults).

pub mod momentum;
pub mod support;
pub mod volatility;
pub mod volume;

pub use momentum::MomentumFactor;
pub use support::SupportFactor;
pub use volatility::VolatilityFactor;
pub use volume::VolumeFactor;
