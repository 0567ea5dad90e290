use crate::orchestrator::TierError;
use crate::Record;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Extracts one record per element matching `selector`
///
/// With no `fields`, each record is `{"text": ...}` holding the element's
/// text. Otherwise each field is the text of the first descendant matching
/// the field's selector, or `null` when nothing matches.
///
/// # Example
///
/// ```
/// use shelf_sentry::adapters::extract_html;
/// use std::collections::BTreeMap;
///
/// let html = r#"<ul><li class="p"><b>Кашкавал</b> <i>12.99</i></li></ul>"#;
/// let fields = BTreeMap::from([
///     ("name".to_string(), "b".to_string()),
///     ("price".to_string(), "i".to_string()),
/// ]);
/// let records = extract_html(html, "li.p", &fields).unwrap();
/// assert_eq!(records[0]["price"], "12.99");
/// ```
pub fn extract(
    body: &str,
    selector: &str,
    fields: &BTreeMap<String, String>,
) -> Result<Vec<Record>, TierError> {
    let item_selector = parse_selector(selector)?;
    let field_selectors = fields
        .iter()
        .map(|(name, css)| Ok((name.as_str(), parse_selector(css)?)))
        .collect::<Result<Vec<_>, TierError>>()?;

    let document = Html::parse_document(body);

    let records = document
        .select(&item_selector)
        .map(|element| {
            if field_selectors.is_empty() {
                return serde_json::json!({ "text": element_text(element) });
            }

            let record: Map<String, Value> = field_selectors
                .iter()
                .map(|(name, sel)| {
                    let value = element
                        .select(sel)
                        .next()
                        .map(|e| Value::String(element_text(e)))
                        .unwrap_or(Value::Null);
                    (name.to_string(), value)
                })
                .collect();
            Value::Object(record)
        })
        .collect();

    Ok(records)
}

fn parse_selector(css: &str) -> Result<Selector, TierError> {
    Selector::parse(css).map_err(|e| TierError::Parse(format!("invalid selector '{}': {:?}", css, e)))
}

/// Element text with whitespace runs collapsed
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
