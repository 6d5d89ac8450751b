pub mod basic;
pub mod cdp;
pub mod session;
pub mod snapshot;
