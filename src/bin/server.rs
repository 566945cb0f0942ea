//! `CoCreate.AI` server binary: the `OpenRouter` proxy, the stream function and the static app.
//! Run with: cargo run --bin cocreate-server

use std::process::ExitCode;

use cocreate::start_cocreate;

fn main() -> ExitCode {
    start_cocreate::run()
}
