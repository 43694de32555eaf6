//! CSV table of batch results.

use std::io::Write;

use mesh_check::CheckResult;

const HEADER: [&str; 9] = [
    "File",
    "Watertight",
    "Non-Manifold Vertices",
    "Self-Intersections",
    "Holes",
    "Degenerate Faces",
    "Has UVs",
    "Overlapping UVs",
    "UVs Out of Bounds",
];

/// Quote a field if it contains a separator, quote or newline.
fn field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "Yes" } else { "No" }
}

/// Writes one row per checked file, flushing after each row.
pub struct CsvWriter<W: Write> {
    out: W,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(mut out: W) -> std::io::Result<Self> {
        writeln!(out, "{}", HEADER.join(","))?;
        Ok(Self { out })
    }

    pub fn write_row(&mut self, file: &str, result: &CheckResult) -> std::io::Result<()> {
        writeln!(
            self.out,
            "{},{},{},{},{},{},{},{},{}",
            field(file),
            yes_no(result.is_watertight),
            result.non_manifold_vertex_count,
            result.self_intersection_count,
            result.hole_count,
            result.degenerate_face_count,
            yes_no(result.has_uvs),
            result.overlapping_uv_count,
            result.uv_out_of_bounds_count,
        )?;
        self.out.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Row for a file that could not be checked: the error goes in the
    /// first result column and the rest stay empty.
    pub fn write_error_row(&mut self, file: &str, error: &str) -> std::io::Result<()> {
        let marker = format!("Error: {}", error);
        writeln!(self.out, "{},{},,,,,,,", field(file), field(&marker))?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_and_row() {
        let mut buf = Vec::new();
        {
            let mut writer = CsvWriter::new(&mut buf).unwrap();
            let result = CheckResult {
                is_watertight: true,
                hole_count: 2,
                ..Default::default()
            };
            writer.write_row("a.obj", &result).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], HEADER.join(","));
        assert_eq!(lines[1], "a.obj,Yes,0,0,2,0,No,0,0");
    }

    #[test]
    fn test_error_row_keeps_column_count() {
        let mut buf = Vec::new();
        {
            let mut writer = CsvWriter::new(&mut buf).unwrap();
            writer
                .write_error_row("broken.obj", "failed to load broken.obj: bad face")
                .unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert_eq!(row, "broken.obj,Error: failed to load broken.obj: bad face,,,,,,,");
        assert_eq!(row.split(',').count(), HEADER.len());
    }

    #[test]
    fn test_field_quoting() {
        assert_eq!(field("plain.obj"), "plain.obj");
        assert_eq!(field("a,b.obj"), "\"a,b.obj\"");
        assert_eq!(field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
