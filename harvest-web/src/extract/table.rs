use crate::dom::{element_text, select_all};
use crate::record::Record;
use scraper::{ElementRef, Html};

/// One record per data row of every table on the page.
///
/// The first row of each table supplies the column labels. Cells past the
/// last label, or under a blank label, are keyed by their zero-based column
/// index. Rows without any `td` are skipped.
pub fn extract_tables(doc: &Html) -> Vec<Record> {
    let mut out = Vec::new();
    for table in select_all(doc.root_element(), "table") {
        let rows = own_rows(table);
        let Some((head, body)) = rows.split_first() else {
            continue;
        };
        let labels: Vec<String> = cells(*head).into_iter().map(element_text).collect();

        for row in body {
            let cells = cells(*row);
            if !cells.iter().any(|c| c.value().name() == "td") {
                continue;
            }
            let mut record = Record::new();
            for (i, cell) in cells.into_iter().enumerate() {
                let key = column_key(&labels, i, &record);
                record.insert(key, element_text(cell));
            }
            out.push(record);
        }
    }
    out
}

/// Rows that belong to `table` itself rather than a table nested inside it.
fn own_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    select_all(table, "tr")
        .into_iter()
        .filter(|tr| {
            tr.ancestors()
                .filter_map(ElementRef::wrap)
                .find(|a| a.value().name() == "table")
                .is_some_and(|t| t.id() == table.id())
        })
        .collect()
}

fn cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
        .collect()
}

fn column_key(labels: &[String], i: usize, record: &Record) -> String {
    match labels.get(i).filter(|l| !l.is_empty()) {
        // Repeated header labels would otherwise overwrite each other.
        Some(label) if record.contains(label) => format!("{label}_{i}"),
        Some(label) => label.clone(),
        None => i.to_string(),
    }
}
