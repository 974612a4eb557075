pub mod paper;
pub mod traits;

pub use paper::PaperGateway;
pub use traits::{MarketGateway, PerpetualGateway};
