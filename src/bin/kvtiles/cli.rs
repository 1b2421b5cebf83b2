use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// kvtiles: PMTiles archives and embedded tile stores
#[derive(Parser, Debug)]
#[command(name = "kvtiles", version, about = "Tile storage CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Build an embedded store from a JSON tile dump
    ///
    /// Dump format (tile data base64):
    ///   modern: {"tiles":[{"z":0,"x":0,"y":0,"data":"..."}]}
    ///   legacy: {"map":[{"z":0,"x":0,"y":0,"tile_id":"1"}],"images":[{"tile_id":"1","data":"..."}]}
    Import {
        /// JSON dump file
        #[arg(long)]
        dump: PathBuf,
        /// Target store directory (must not hold a store yet)
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value_t = 14)]
        max_zoom: u8,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        center_lat: f64,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        center_lng: f64,
        /// Region name recorded in map infos
        #[arg(long, default_value = "")]
        region: String,
    },
    /// Read one tile (XYZ) from a store directory, archive path or URL
    Get {
        #[arg(long)]
        locator: String,
        #[arg(long)]
        z: u8,
        #[arg(long)]
        x: u64,
        #[arg(long)]
        y: u64,
        /// Optional file to write raw tile bytes into
        #[arg(long)]
        out: Option<PathBuf>,
        /// Deadline for the whole lookup
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Print map infos (and archive header / store stats)
    Info {
        #[arg(long)]
        locator: String,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}
