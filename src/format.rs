use crate::last_resort;
use crate::record::Record;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

/// How the logger renders the line handed to every sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputFormat {
    /// One flat JSON object per line.
    #[default]
    Json,
    /// `time \t colored level \t message \t json fields`, for terminals.
    Debug,
}

impl OutputFormat {
    pub fn render(&self, record: &Record) -> Result<String, serde_json::Error> {
        let json = record.fields.to_json()?;
        Ok(match self {
            OutputFormat::Json => json,
            OutputFormat::Debug => format!(
                "{}\t{}\t{}\t{}",
                record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                record.level.colored(),
                record.message,
                json
            ),
        })
    }

    /// Render, falling back to a plain `LEVEL\tmessage` line when the
    /// field set cannot be encoded.
    pub(crate) fn render_or_fallback(&self, record: &Record) -> String {
        match self.render(record) {
            Ok(line) => line,
            Err(e) => {
                last_resort::report("error during formatting log record", &e);
                format!("{}\t{}", record.level, record.message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use crate::record::Fields;
    use chrono::Utc;

    fn record() -> Record {
        let mut fields = Fields::new();
        fields.set("user", "bob");
        Record::compose(Level::Warning, "disk low".into(), fields, Utc::now())
    }

    #[test]
    fn json_line_is_flat_object() {
        let line = OutputFormat::Json.render(&record()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["user"], "bob");
        assert_eq!(value["level"], "WARNING");
        assert_eq!(value["message"], "disk low");
        assert!(value["time"].is_string());
    }

    #[test]
    fn debug_line_has_four_tab_separated_columns() {
        let line = OutputFormat::Debug.render(&record()).unwrap();
        let columns: Vec<&str> = line.splitn(4, '\t').collect();
        assert_eq!(columns.len(), 4);
        assert!(columns[1].contains("WARNING"));
        assert!(columns[1].starts_with("\x1b[0;33m"));
        assert_eq!(columns[2], "disk low");
        assert!(serde_json::from_str::<serde_json::Value>(columns[3]).is_ok());
    }
}
