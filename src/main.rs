use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use whatsrelay::cli;

fn init_logging(verbose: bool) {
    let filter_level = if verbose { Level::DEBUG } else { Level::INFO };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(filter_level.into()))
        .with_target(true) // Show module path
        .with_level(true) // Show log level
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::time())
        .init();
}

fn main() {
    // A missing .env file is normal in production
    let dotenv = dotenvy::dotenv();

    // Parse CLI early to check verbose flag before full initialization
    let cli = match cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            use clap::error::ErrorKind;

            e.print().ok();
            match e.kind() {
                ErrorKind::DisplayVersion | ErrorKind::DisplayHelp => std::process::exit(0),
                _ => std::process::exit(2),
            }
        }
    };

    init_logging(cli.verbose);
    tracing::debug!("Verbose mode enabled");
    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded environment from .env");
    }

    if let Err(e) = cli::run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
