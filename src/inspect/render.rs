//! inspect::render
//!
//! Output formats and the renderer that writes one record per block.
//!
//! # Formats
//!
//! | `--output` | Format          | Per block                                 |
//! |------------|-----------------|-------------------------------------------|
//! | (empty)    | `NameOnly`      | entry name and a newline, no bucket read  |
//! | `json`     | `CanonicalJson` | tab-indented metadata document            |
//! | other      | `Template`      | template expansion and a newline          |

use std::io::Write;

use serde_json::Value;

use crate::core::block::BlockEntry;
use crate::core::meta::BlockMeta;

use super::error::InspectError;
use super::template::Template;

/// How each block is printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    /// The block's entry name only.
    NameOnly,
    /// The re-encoded metadata document.
    CanonicalJson,
    /// A user template applied to the metadata document.
    Template(Template),
}

impl OutputFormat {
    /// Select a format from the `--output` flag value.
    ///
    /// # Errors
    ///
    /// `SetupFailed` if the value is neither empty nor `json` and does not
    /// parse as a template.
    ///
    /// # Example
    ///
    /// ```
    /// use blockscope::inspect::OutputFormat;
    ///
    /// assert_eq!(OutputFormat::parse("").unwrap(), OutputFormat::NameOnly);
    /// assert_eq!(OutputFormat::parse("json").unwrap(), OutputFormat::CanonicalJson);
    /// assert!(OutputFormat::parse("{{.ULID").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, InspectError> {
        match s {
            "" => Ok(OutputFormat::NameOnly),
            "json" => Ok(OutputFormat::CanonicalJson),
            other => Template::parse(other)
                .map(OutputFormat::Template)
                .map_err(|e| InspectError::SetupFailed(format!("invalid template: {}", e))),
        }
    }

    /// Check if the format prints metadata, and so must fetch it.
    pub fn needs_meta(&self) -> bool {
        !matches!(self, OutputFormat::NameOnly)
    }
}

/// Writes rendered blocks to an output stream.
pub struct Renderer<W: Write> {
    format: OutputFormat,
    out: W,
}

impl<W: Write> Renderer<W> {
    pub fn new(format: OutputFormat, out: W) -> Self {
        Self { format, out }
    }

    pub fn needs_meta(&self) -> bool {
        self.format.needs_meta()
    }

    /// Render one block.
    ///
    /// `meta` may be `None` only for formats that do not need metadata.
    ///
    /// # Errors
    ///
    /// `RenderFailed` if metadata is required but missing, encoding or
    /// template execution fails, or the output cannot be written.
    pub fn render(&mut self, entry: &BlockEntry, meta: Option<&BlockMeta>) -> Result<(), InspectError> {
        let fail = |reason: String| InspectError::RenderFailed {
            entry: entry.display_name().to_string(),
            reason,
        };

        let text = match (&self.format, meta) {
            (OutputFormat::NameOnly, _) => format!("{}\n", entry.display_name()),
            (_, None) => return Err(fail("metadata required but not fetched".into())),
            (OutputFormat::CanonicalJson, Some(meta)) => {
                meta.to_canonical_json().map_err(|e| fail(e.to_string()))?
            }
            (OutputFormat::Template(tmpl), Some(meta)) => {
                let data = template_data(meta).map_err(|e| fail(e.to_string()))?;
                let mut text = tmpl.execute(&data).map_err(|e| fail(e.to_string()))?;
                text.push('\n');
                text
            }
        };

        self.out
            .write_all(text.as_bytes())
            .map_err(|e| fail(format!("write output: {}", e)))
    }

    pub fn flush(&mut self) -> Result<(), InspectError> {
        self.out.flush().map_err(|e| InspectError::RenderFailed {
            entry: String::new(),
            reason: format!("flush output: {}", e),
        })
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Template view of a document: the encoded form, with zero statistics
/// present so templates can reference them.
fn template_data(meta: &BlockMeta) -> Result<Value, serde_json::Error> {
    let mut value = serde_json::to_value(meta)?;
    if let Some(stats) = value.get_mut("stats").and_then(Value::as_object_mut) {
        for (key, n) in [
            ("numSamples", meta.stats.num_samples),
            ("numSeries", meta.stats.num_series),
            ("numChunks", meta.stats.num_chunks),
            ("numTombstones", meta.stats.num_tombstones),
        ] {
            stats.entry(key).or_insert_with(|| Value::from(n));
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::ErrorKind;

    fn entry(name: &str) -> BlockEntry {
        BlockEntry::parse(name).unwrap()
    }

    fn meta() -> BlockMeta {
        let mut meta = BlockMeta::new("01ABC", 0, 100);
        meta.stats.num_samples = 42;
        meta.labels.insert("env".into(), "prod".into());
        meta
    }

    /// Writer that fails every write.
    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    mod output_format {
        use super::*;

        #[test]
        fn selection() {
            assert_eq!(OutputFormat::parse("").unwrap(), OutputFormat::NameOnly);
            assert_eq!(OutputFormat::parse("json").unwrap(), OutputFormat::CanonicalJson);
            assert!(matches!(
                OutputFormat::parse("{{.ULID}}").unwrap(),
                OutputFormat::Template(_)
            ));
        }

        #[test]
        fn json_is_case_sensitive() {
            // Anything other than exactly "json" is a template.
            assert!(matches!(
                OutputFormat::parse("JSON").unwrap(),
                OutputFormat::Template(_)
            ));
        }

        #[test]
        fn bad_template_is_setup_error() {
            let err = OutputFormat::parse("{{.ULID").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Setup);
        }

        #[test]
        fn template_errors_surface_before_listing() {
            for bad in ["{{html .ULID}}", "{{range .Compaction.Sources}}", "{{$x}}", "{{break}}"] {
                let err = OutputFormat::parse(bad).unwrap_err();
                assert_eq!(err.kind(), ErrorKind::Setup, "{}", bad);
            }
        }

        #[test]
        fn needs_meta() {
            assert!(!OutputFormat::NameOnly.needs_meta());
            assert!(OutputFormat::CanonicalJson.needs_meta());
            assert!(OutputFormat::parse("x").unwrap().needs_meta());
        }
    }

    mod renderer {
        use super::*;

        #[test]
        fn name_only() {
            let mut r = Renderer::new(OutputFormat::NameOnly, Vec::new());
            r.render(&entry("01ABC/"), None).unwrap();
            r.render(&entry("tenant/01DEF/"), None).unwrap();
            assert_eq!(r.into_inner(), b"01ABC\ntenant/01DEF\n");
        }

        #[test]
        fn canonical_json() {
            let mut r = Renderer::new(OutputFormat::CanonicalJson, Vec::new());
            r.render(&entry("01ABC/"), Some(&meta())).unwrap();
            let out = String::from_utf8(r.into_inner()).unwrap();
            assert!(out.starts_with("{\n\t\"ulid\": \"01ABC\""));
            assert!(out.ends_with("}\n"));
            assert!(out.contains("\t\t\"numSamples\": 42"));
        }

        #[test]
        fn template() {
            let format = OutputFormat::parse("{{.ULID}} {{.Labels.env}}").unwrap();
            let mut r = Renderer::new(format, Vec::new());
            r.render(&entry("01ABC/"), Some(&meta())).unwrap();
            assert_eq!(r.into_inner(), b"01ABC prod\n");
        }

        #[test]
        fn template_control_and_functions() {
            let format = OutputFormat::parse(
                r#"{{.ULID | printf "%-6s"}}|{{range $k, $v := .Labels}}{{$k}}={{$v}}{{end}}|{{len .Compaction.Sources}}"#,
            )
            .unwrap();
            let mut r = Renderer::new(format, Vec::new());
            r.render(&entry("01ABC/"), Some(&meta())).unwrap();
            assert_eq!(r.into_inner(), b"01ABC |env=prod|1\n");
        }

        #[test]
        fn template_sees_zero_stats() {
            let format = OutputFormat::parse("{{.Stats.NumSeries}}").unwrap();
            let mut r = Renderer::new(format, Vec::new());
            r.render(&entry("01ABC/"), Some(&meta())).unwrap();
            assert_eq!(r.into_inner(), b"0\n");
        }

        #[test]
        fn template_exec_failure_is_render_error() {
            let format = OutputFormat::parse("{{.Missing}}").unwrap();
            let mut r = Renderer::new(format, Vec::new());
            let err = r.render(&entry("01ABC/"), Some(&meta())).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Render);
            assert!(r.into_inner().is_empty());
        }

        #[test]
        fn missing_meta_is_render_error() {
            let mut r = Renderer::new(OutputFormat::CanonicalJson, Vec::new());
            let err = r.render(&entry("01ABC/"), None).unwrap_err();
            assert!(matches!(err, InspectError::RenderFailed { ref entry, .. } if entry == "01ABC"));
        }

        #[test]
        fn write_failure_is_render_error() {
            let mut r = Renderer::new(OutputFormat::NameOnly, BrokenPipe);
            let err = r.render(&entry("01ABC/"), None).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Render);
            assert!(err.to_string().contains("write output"));
        }
    }
}
