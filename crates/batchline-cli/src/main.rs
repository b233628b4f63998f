//! Binary entrypoint for the Batchline CLI.

#[tokio::main]
async fn main() {
    let exit_code = batchline_cli::run().await;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}
