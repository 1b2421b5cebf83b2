//! Tile addressing: (z, x, y) <-> global tile id along a Hilbert curve.
//!
//! Ids enumerate zoom levels in order; zoom z starts at (4^z - 1) / 3 and
//! covers 4^z ids in Hilbert order. This must match the PMTiles v3 enumeration
//! bit for bit, otherwise directory lookups land on the wrong entries.

use crate::consts::MAX_ZOOM;

/// First tile id of zoom level `z`.
#[inline]
pub fn zoom_base(z: u8) -> u64 {
    ((1u64 << (2 * z as u32)) - 1) / 3
}

#[inline]
fn rotate(n: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = n - 1 - *x;
            *y = n - 1 - *y;
        }
        std::mem::swap(x, y);
    }
}

/// Tile id for (z, x, y). None if z > MAX_ZOOM or x/y are outside 0..2^z.
pub fn zxy_to_tile_id(z: u8, x: u64, y: u64) -> Option<u64> {
    if z > MAX_ZOOM {
        return None;
    }
    let n = 1u64 << z;
    if x >= n || y >= n {
        return None;
    }

    let (mut tx, mut ty) = (x, y);
    let mut d = 0u64;
    let mut s = n / 2;
    while s > 0 {
        let rx = u64::from(tx & s > 0);
        let ry = u64::from(ty & s > 0);
        d += s * s * ((3 * rx) ^ ry);
        rotate(n, &mut tx, &mut ty, rx, ry);
        s /= 2;
    }
    Some(zoom_base(z) + d)
}

/// Inverse of [`zxy_to_tile_id`].
pub fn tile_id_to_zxy(id: u64) -> Option<(u8, u64, u64)> {
    let mut z = 0u8;
    while z <= MAX_ZOOM {
        let base = zoom_base(z);
        let count = 1u64 << (2 * z as u32);
        if id < base + count {
            let (x, y) = hilbert_d2xy(1u64 << z, id - base);
            return Some((z, x, y));
        }
        z += 1;
    }
    None
}

fn hilbert_d2xy(n: u64, d: u64) -> (u64, u64) {
    let (mut x, mut y) = (0u64, 0u64);
    let mut t = d;
    let mut s = 1u64;
    while s < n {
        let rx = 1 & (t / 2);
        let ry = 1 & (t ^ rx);
        rotate(s, &mut x, &mut y, rx, ry);
        x += s * rx;
        y += s * ry;
        t /= 4;
        s *= 2;
    }
    (x, y)
}
