/// Format a byte count with binary units, e.g. `1.50 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const UNIT_SIZE: f64 = 1024.0;

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= UNIT_SIZE && unit_index < UNITS.len() - 1 {
        size /= UNIT_SIZE;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format a size limit the way users read it: whole megabytes as `10MB`,
/// anything else through [`format_bytes`].
pub fn format_limit(bytes: u64) -> String {
    const MB: u64 = 1024 * 1024;

    if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else {
        format_bytes(bytes)
    }
}
