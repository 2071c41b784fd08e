//! Storefront business flows
//!
//! Page objects over the core's [`PageHandle`] seam, expressing the user
//! journeys of the storefront under test: browse, filter, sort, paginate,
//! add-to-cart, and submit-contact-form. Actions with a backend effect go
//! through the network-correlated sync primitive instead of fixed delays.
//!
//! [`PageHandle`]: storecheck_core::PageHandle

pub mod pages;

use thiserror::Error;

use storecheck_core::HarnessError;

/// Flow-level failures: harness/driver errors plus assertion-style
/// problems detected while reading page state.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error(transparent)]
    Harness(#[from] HarnessError),

    #[error("unexpected page state: {0}")]
    UnexpectedState(String),
}

impl From<storecheck_core::error::DriverError> for FlowError {
    fn from(e: storecheck_core::error::DriverError) -> Self {
        FlowError::Harness(HarnessError::Driver(e))
    }
}

pub type FlowResult<T> = Result<T, FlowError>;

pub use pages::contact::ContactPage;
pub use pages::header::Header;
pub use pages::home::HomePage;
pub use pages::product_details::ProductDetailsPage;
