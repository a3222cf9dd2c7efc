use peppol_cli::cli;
use tracing::error;

fn main() {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(cli::cli()) {
        error!(error = %e, "Run failed");
        std::process::exit(1);
    }
}
