//! Payment gateway adapters.

mod envelope;
mod http_client;
mod mock_gateway;

pub use envelope::EnvelopeCodec;
pub use http_client::HttpPaymentGateway;
pub use mock_gateway::{MockPaymentGateway, MOCK_SIGNATURE_SECRET};
