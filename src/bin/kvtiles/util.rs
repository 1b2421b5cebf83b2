pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            if i % 16 == 0 {
                out.push('\n');
            } else {
                out.push(' ');
            }
        }
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Locators naming a local store directory (as opposed to an archive).
pub fn is_store_dir(locator: &str) -> bool {
    let p = std::path::Path::new(locator);
    p.is_dir() && p.join(kvtiles::consts::KV_FILE).is_file()
}
