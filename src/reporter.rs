use crate::models::Candidate;
use itertools::Itertools;

const HEADERS: [&str; 6] = ["schema", "table", "index", "idx_scan", "table_size", "index_size"];
/// Columns rendered right-aligned
const NUMERIC: [bool; 6] = [false, false, false, true, true, true];

/// Renders candidates as a fixed-width text table, one line per candidate
/// under a header and separator.
pub fn preview_table(candidates: &[Candidate]) -> String {
    let rows: Vec<[String; 6]> = candidates
        .iter()
        .map(|c| {
            [
                c.schema.clone(),
                c.table.clone(),
                c.index.clone(),
                c.scans.to_string(),
                format_bytes(c.table_bytes),
                format_bytes(c.index_bytes),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let header = render_line(&HEADERS.map(str::to_string), &widths);
    let separator = widths.iter().map(|w| "-".repeat(*w)).join("-+-");

    std::iter::once(header)
        .chain(std::iter::once(separator))
        .chain(rows.iter().map(|row| render_line(row, &widths)))
        .join("\n")
}

fn render_line(cells: &[String; 6], widths: &[usize; 6]) -> String {
    cells
        .iter()
        .zip(widths)
        .zip(NUMERIC)
        .map(|((cell, width), numeric)| {
            if numeric {
                format!("{:>width$}", cell, width = *width)
            } else {
                format!("{:<width$}", cell, width = *width)
            }
        })
        .join(" | ")
        .trim_end()
        .to_string()
}

/// Human-readable size using binary units, e.g. `12.5 MB`
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["kB", "MB", "GB", "TB", "PB"];

    if bytes.unsigned_abs() < 1024 {
        return format!("{} bytes", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value.abs() >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
