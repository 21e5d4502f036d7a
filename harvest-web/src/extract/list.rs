use crate::dom::{element_text, has_class, select_all};
use crate::record::Record;
use scraper::{ElementRef, Html};

/// One record per block container, grouping the text of its direct element
/// children by tag name.
///
/// With `class_hint`, only containers carrying that class are considered.
/// Containers whose children are all empty produce nothing.
pub fn extract_lists(doc: &Html, class_hint: Option<&str>) -> Vec<Record> {
    let mut out = Vec::new();
    for block in select_all(doc.root_element(), "div, ul, ol") {
        if let Some(class) = class_hint {
            if !has_class(block, class) {
                continue;
            }
        }
        let mut record = Record::new();
        for child in block.children().filter_map(ElementRef::wrap) {
            let text = element_text(child);
            if !text.is_empty() {
                record.push_text(child.value().name(), text);
            }
        }
        if !record.is_empty() {
            out.push(record);
        }
    }
    out
}
