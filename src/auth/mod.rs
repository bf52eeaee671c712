pub mod handlers;
pub mod password;
pub mod referral;
pub mod session;
