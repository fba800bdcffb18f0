use clap::Parser;
use env_logger::Env;
use log::error;

use incast_gen::app;
use incast_gen::cli::Cli;

fn main() {
    let cli = Cli::parse();

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    if cli.debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    if let Err(e) = app::run(&cli) {
        error!("{e}");
        std::process::exit(1);
    }
}
