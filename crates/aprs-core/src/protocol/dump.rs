//! Hex/ASCII dump of outbound frames for debug logging.
//!
//! Each row covers 16 bytes:
//!
//! ```text
//! 0000:  4E 30 43 41 4C 4C 3E 41 50 52 53 3A 3E 68 69 0D    *N0CALL>APRS:>hi.*
//! ```

use tracing::debug;

const BYTES_PER_ROW: usize = 16;

/// Formats `data` as dump rows.  An empty slice yields no rows.
pub fn hex_dump(data: &[u8]) -> Vec<String> {
    data.chunks(BYTES_PER_ROW)
        .enumerate()
        .map(|(row, chunk)| {
            let mut hex = String::with_capacity(BYTES_PER_ROW * 3);
            for byte in chunk {
                hex.push_str(&format!("{byte:02X} "));
            }
            for _ in chunk.len()..BYTES_PER_ROW {
                hex.push_str("   ");
            }

            let ascii: String = chunk
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() || b == b' ' {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect();

            format!("{:04X}:  {hex}   *{ascii}*", row * BYTES_PER_ROW)
        })
        .collect()
}

/// Writes `title` and the dump of `data` to the `debug` log level.
pub fn dump_frame(title: &str, data: &[u8]) {
    debug!("{title}");
    for row in hex_dump(data) {
        debug!("{row}");
    }
}
