//! ID photo CLI tool
//!
//! Command-line front end for the idphoto-pipeline library.

#[cfg(feature = "cli")]
use idphoto_pipeline::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
