use clap::Parser;
use habit_app::app::run;
use habit_app::cli::Cli;
use habit_app::config::AppConfig;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let config = AppConfig::from_env().unwrap_or_default();
    if let Err(err) = run(cli, config) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
