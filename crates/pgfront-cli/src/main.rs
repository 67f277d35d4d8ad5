//! Binary entrypoint for the pgfront administrative CLI.

#[tokio::main]
async fn main() {
    let exit_code = pgfront_cli::run().await;
    std::process::exit(exit_code);
}
