pub mod principal;
pub mod request;
pub mod step;
