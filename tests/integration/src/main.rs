//! Integration scenarios for the cinder coordination core.
//!
//! Everything runs in-process against fake connections and a scripted
//! reload step; no server is required.

mod helpers;

mod broker;
mod refresh;

fn main() {
    // The binary exists to host the test modules; run with `cargo test`.
}
