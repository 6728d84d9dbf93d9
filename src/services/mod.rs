pub mod requests;
pub mod transfer;
