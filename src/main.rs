//! `udpcam` receiver entry point
//!
//! Configuration is read from `UDPCAM_CONFIG` and `UDPCAM_*` variables; see
//! [`udpcam_lib::config`].

fn main() -> anyhow::Result<()> {
    udpcam_lib::run()
}
