//! Seams to the world outside the scraper: where records go, and optional
//! third-party lookups that add fields to them.

use crate::record::{FieldValue, Record};
use anyhow::Result;
use async_trait::async_trait;
use std::io::Write;
use std::sync::Arc;

/// Destination for a finished record set.
pub trait RecordSink {
    fn write(&mut self, records: &[Record]) -> Result<()>;
}

/// One JSON object per line.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn write(&mut self, records: &[Record]) -> Result<()> {
        for record in records {
            serde_json::to_writer(&mut self.out, record)?;
            self.out.write_all(b"\n")?;
        }
        self.out.flush()?;
        Ok(())
    }
}

/// External lookup keyed on a record, e.g. a ratings service queried by
/// title. Returned fields are merged into the record.
#[async_trait]
pub trait RecordEnrichment: Send + Sync {
    fn name(&self) -> &str;

    async fn lookup(&self, record: &Record) -> Result<Vec<(String, FieldValue)>>;
}

/// Run every lookup against every record. A failed lookup leaves the record
/// as it was.
pub async fn apply_enrichments(records: &mut [Record], lookups: &[Arc<dyn RecordEnrichment>]) {
    for lookup in lookups {
        for record in records.iter_mut() {
            match lookup.lookup(record).await {
                Ok(fields) => record.merge_fields(fields),
                Err(e) => tracing::warn!(
                    target: "harvest.sink",
                    lookup = lookup.name(),
                    error = %e,
                    "lookup.failed"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DetailInfo;

    #[test]
    fn writes_one_object_per_line() {
        let mut a = Record::named_link("Jane", "https://a.com/jane");
        a.set_detail(Some(DetailInfo {
            bio: "Partner".into(),
            images: vec![],
        }));
        let b = Record::named_link("John", "https://a.com/john");

        let mut sink = JsonLinesSink::new(Vec::new());
        sink.write(&[a, b]).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            r#"{"name":"Jane","link":"https://a.com/jane","detail":{"bio":"Partner","images":[]}}"#
        );
    }

    struct Ratings;

    #[async_trait]
    impl RecordEnrichment for Ratings {
        fn name(&self) -> &str {
            "ratings"
        }

        async fn lookup(&self, record: &Record) -> Result<Vec<(String, FieldValue)>> {
            match record.display_name() {
                Some("Alpha") => Ok(vec![("rating".into(), "7.9".into())]),
                _ => anyhow::bail!("not found"),
            }
        }
    }

    #[tokio::test]
    async fn failed_lookups_leave_records_untouched() {
        let mut records = vec![
            Record::named_link("Alpha", "https://a.com/alpha"),
            Record::named_link("Beta", "https://a.com/beta"),
        ];
        let lookups: Vec<Arc<dyn RecordEnrichment>> = vec![Arc::new(Ratings)];
        apply_enrichments(&mut records, &lookups).await;
        assert_eq!(records[0].text("rating"), Some("7.9"));
        assert_eq!(records[1].len(), 2);
    }
}
