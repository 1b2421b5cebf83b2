use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use kvtiles::{open_store, KvTilesConfig, ReadCtx};

use super::util::hex_dump;

pub fn exec(
    locator: String,
    z: u8,
    x: u64,
    y: u64,
    out: Option<PathBuf>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let cfg = KvTilesConfig::from_env();
    let store = open_store(&locator, &cfg).with_context(|| format!("open {}", locator))?;
    let ctx = match timeout_ms {
        Some(ms) => ReadCtx::with_timeout(Duration::from_millis(ms)),
        None => ReadCtx::background(),
    };

    match store.fetch_tile(&ctx, z, x, y)? {
        Some(v) => {
            let enc = store
                .tile_compression()
                .content_encoding()
                .unwrap_or("identity");
            if let Some(out_path) = out {
                if let Some(parent) = out_path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                let mut f = OpenOptions::new()
                    .create(true)
                    .truncate(true)
                    .write(true)
                    .open(&out_path)
                    .with_context(|| format!("open {}", out_path.display()))?;
                f.write_all(&v)?;
                f.sync_all()?;
                println!(
                    "FOUND {}/{}/{}: {} B ({}) -> wrote to {}",
                    z,
                    x,
                    y,
                    v.len(),
                    enc,
                    out_path.display()
                );
            } else {
                println!("FOUND {}/{}/{}: {} B ({})", z, x, y, v.len(), enc);
                println!("hex:  {}", hex_dump(&v[..v.len().min(64)]));
            }
        }
        None => println!("NOT FOUND {}/{}/{}", z, x, y),
    }
    Ok(())
}
