use crate::dom::select_first;
use scraper::Html;
use serde::Serialize;

/// Coarse layout of a listing page, used to pick an extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentShape {
    Tabular,
    ListLike,
    LinkCollection,
    Unknown,
}

/// First match wins: a table anywhere, then a list, then any block container.
pub fn classify(doc: &Html) -> ContentShape {
    let root = doc.root_element();
    if select_first(root, "table").is_some() {
        ContentShape::Tabular
    } else if select_first(root, "ul, ol").is_some() {
        ContentShape::ListLike
    } else if select_first(root, "div, section, article, main").is_some() {
        ContentShape::LinkCollection
    } else {
        ContentShape::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(html: &str) -> ContentShape {
        classify(&Html::parse_document(html))
    }

    #[test]
    fn table_beats_everything() {
        assert_eq!(
            shape("<div><ul><li>a</li></ul><table><tr><td>1</td></tr></table></div>"),
            ContentShape::Tabular
        );
    }

    #[test]
    fn list_beats_containers() {
        assert_eq!(shape("<div><ol><li>a</li></ol></div>"), ContentShape::ListLike);
    }

    #[test]
    fn containers_mean_links() {
        assert_eq!(shape("<section><a href='/x'>x</a></section>"), ContentShape::LinkCollection);
    }

    #[test]
    fn bare_text_is_unknown() {
        assert_eq!(shape("<p>just text</p>"), ContentShape::Unknown);
    }
}
