pub mod credit_role;
pub mod license_status;
pub mod purchase_status;
pub mod redemption_source;
pub mod referral_status;
pub mod tier;
