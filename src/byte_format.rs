const UNITS: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

/// Formats a byte count using binary units, e.g. `1536 -> "1.5 KiB"`.
///
/// Values below 1024 in magnitude are printed as-is with a `B` suffix.
/// The unit is chosen with the `0x0FFF_CCCC_CCCC_CCCC >> shift` cutoff so
/// that the rounded value never reaches `1024.0` of the chosen unit.
pub fn human_readable_byte_count(bytes: i64) -> String {
    let abs = if bytes == i64::MIN { i64::MAX } else { bytes.abs() };
    if abs < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = abs;
    let mut unit = 0;
    let mut shift = 40;
    while shift >= 0 && abs > (0x0FFF_CCCC_CCCC_CCCC_i64 >> shift) {
        value >>= 10;
        unit += 1;
        shift -= 10;
    }

    // value / 1024 to one decimal, ties rounded away from zero
    let tenths = (value * 10 + 512) / 1024;
    let sign = if bytes < 0 { "-" } else { "" };
    format!("{}{}.{} {}iB", sign, tenths / 10, tenths % 10, UNITS[unit])
}
