pub mod classify;
pub mod commons;
pub mod run;
pub mod session;
