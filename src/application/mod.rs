pub mod app_error;
pub mod checkout;
pub mod ports;
pub mod use_cases;
pub mod validators;
