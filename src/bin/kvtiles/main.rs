use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};
use log::error;

mod cli;
mod util;
mod cmd_import;
mod cmd_get;
mod cmd_info;

fn init_logger() {
    // Уровень берём из RUST_LOG, иначе дефолт info.
    // Пример: RUST_LOG=debug ./kvtiles get ...
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Import { dump, path, max_zoom, center_lat, center_lng, region } =>
            cmd_import::exec(dump, path, max_zoom, center_lat, center_lng, region),

        cli::Cmd::Get { locator, z, x, y, out, timeout_ms } =>
            cmd_get::exec(locator, z, x, y, out, timeout_ms),

        cli::Cmd::Info { locator, json } =>
            cmd_info::exec(locator, json),
    }
}
