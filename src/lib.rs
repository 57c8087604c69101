#[macro_use]
extern crate log;

pub mod cli;
pub mod extract;
pub mod io;
pub mod record;
pub mod resolve;
pub mod run;
pub mod summary;
