//! Page objects for the storefront under test

pub mod contact;
pub mod header;
pub mod home;
pub mod product_details;
