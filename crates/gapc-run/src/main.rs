mod cli;

use clap::Parser;

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gapc_cyk=info,gapc_run=info")),
        )
        .init();

    cli::Cli::parse().run()
}
