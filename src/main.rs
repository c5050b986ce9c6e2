//! Unitium demo binary: runs the bundled demo suites.
//!
//! `unitium list`, `unitium test demo/counter`, `unitium demo/timers list`,
//! `unitium --format ndjson` ...

mod demo_suites;

use std::process::ExitCode;

fn main() -> ExitCode {
    unitium::cli::main(demo_suites::registry())
}
