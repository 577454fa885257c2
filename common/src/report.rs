//! XML snapshot reports.
//!
//! One report per captured frame:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <report id="30403" timestamp="20240615T103000+04">
//!   <data lane="1" direction="backward" sensor="video_image_type_jpg">
//!     <value>/9j/4AAQ…</value>
//!   </data>
//! </report>
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use chrono::NaiveDateTime;
use rand::Rng;
use tracing::{debug, info};

const SENSOR: &str = "video_image_type_jpg";
const LANE: &str = "1";

/// One frame pulled from one camera.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub logical_id: u32,
    pub image: Vec<u8>,
    /// Local wall-clock time the frame was received.
    pub captured_at: NaiveDateTime,
}

/// Writes reports into a single output directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
    timestamp_suffix: String,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>, timestamp_suffix: impl Into<String>) -> Self {
        ReportWriter {
            dir: dir.into(),
            timestamp_suffix: timestamp_suffix.into(),
        }
    }

    /// Serialize `image` into a new report file and return its path.
    ///
    /// The output directory is created on demand. A file already sitting
    /// at the generated path is replaced.
    pub fn write(
        &self,
        image: &[u8],
        label: &str,
        direction: &str,
        captured_at: NaiveDateTime,
    ) -> Result<PathBuf> {
        if label.contains(['/', '\\']) || label == ".." {
            anyhow::bail!("Report label {label:?} is not a valid file name");
        }

        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create report directory {}", self.dir.display()))?;

        let path = self
            .dir
            .join(file_name(label, captured_at, random_suffix()));
        if path.exists() {
            debug!("Replacing existing report {}", path.display());
            std::fs::remove_file(&path)
                .with_context(|| format!("Cannot remove {}", path.display()))?;
        }

        let xml = render(image, label, direction, captured_at, &self.timestamp_suffix);
        std::fs::write(&path, xml)
            .with_context(|| format!("Cannot write report {}", path.display()))?;

        info!("Report written: {} ({} image bytes)", path.display(), image.len());
        Ok(path)
    }
}

/// `{label}_{yyyyMMddHHmmss}_{NNNNN}.xml`
pub fn file_name(label: &str, captured_at: NaiveDateTime, suffix: u32) -> String {
    format!(
        "{}_{}_{:05}.xml",
        label,
        captured_at.format("%Y%m%d%H%M%S"),
        suffix % 100_000
    )
}

/// Render the full XML document.
pub fn render(
    image: &[u8],
    label: &str,
    direction: &str,
    captured_at: NaiveDateTime,
    timestamp_suffix: &str,
) -> String {
    let timestamp = format!("{}{}", captured_at.format("%Y%m%dT%H%M%S"), timestamp_suffix);
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <report id=\"{}\" timestamp=\"{}\">\n  \
         <data lane=\"{LANE}\" direction=\"{}\" sensor=\"{SENSOR}\">\n    \
         <value>{}</value>\n  \
         </data>\n\
         </report>\n",
        escape_attr(label),
        escape_attr(&timestamp),
        escape_attr(direction),
        BASE64_STANDARD.encode(image),
    )
}

fn random_suffix() -> u32 {
    rand::thread_rng().gen_range(0..100_000)
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_opt(10, 30, 5)
            .unwrap()
    }

    fn between<'a>(text: &'a str, start: &str, end: &str) -> &'a str {
        let i = text.find(start).unwrap() + start.len();
        let j = text[i..].find(end).unwrap() + i;
        &text[i..j]
    }

    #[test]
    fn test_file_name_pattern() {
        assert_eq!(file_name("30403", at(), 42), "30403_20240615103005_00042.xml");
        assert_eq!(file_name("30403", at(), 99_999), "30403_20240615103005_99999.xml");
    }

    #[test]
    fn test_render_shape() {
        let xml = render(b"jpeg", "30403", "backward", at(), "+04");
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<report id=\"30403\" timestamp=\"20240615T103005+04\">"));
        assert!(xml.contains(
            "<data lane=\"1\" direction=\"backward\" sensor=\"video_image_type_jpg\">"
        ));
        assert_eq!(between(&xml, "<value>", "</value>"), "anBlZw==");
    }

    #[test]
    fn test_attributes_are_escaped() {
        let xml = render(b"", "a&b", "\"in\"", at(), "+04");
        assert!(xml.contains("id=\"a&amp;b\""));
        assert!(xml.contains("direction=\"&quot;in&quot;\""));
    }

    #[test]
    fn test_write_round_trips_image_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path().join("video"), "+04");
        let image: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

        let path = writer.write(&image, "30403", "backward", at()).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("30403_20240615103005_"));
        assert!(name.ends_with(".xml"));
        assert_eq!(name.len(), "30403_20240615103005_00000.xml".len());

        let xml = std::fs::read_to_string(&path).unwrap();
        let decoded = BASE64_STANDARD
            .decode(between(&xml, "<value>", "</value>"))
            .unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn test_label_with_separator_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path(), "+04");
        assert!(writer.write(b"x", "../evil", "forward", at()).is_err());
    }
}
