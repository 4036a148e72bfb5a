//! `keeper build`: build provenance.
//!
//! Date and commit are stamped by CI through `KEEPER_BUILD_DATE` and
//! `KEEPER_BUILD_COMMIT` at compile time; local builds print N/A.

pub fn print() {
    println!("Build version: {}", env!("CARGO_PKG_VERSION"));
    println!("Build date: {}", option_env!("KEEPER_BUILD_DATE").unwrap_or("N/A"));
    println!("Build commit: {}", option_env!("KEEPER_BUILD_COMMIT").unwrap_or("N/A"));
}
