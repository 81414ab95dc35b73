//! Structured-data mining independent of entity rules.
//!
//! Provenance decides confidence: JSON-LD 0.9, microdata 0.8, tables 0.7,
//! forms 0.6, meta tags 0.5, document rows (derived) 0.5.

use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Map, Value};

use super::formats::{header_key, ProcessedContent};
use crate::types::{DataSource, StructuredDataPoint};

const MAX_TABLE_ROWS: usize = 200;

/// Collect every structured data point from processed content.
pub fn mine_structured_data(
    processed: &ProcessedContent,
    document: Option<&Html>,
    limit: usize,
) -> Vec<StructuredDataPoint> {
    let mut points = Vec::new();

    for block in &processed.embedded_structured_data {
        json_ld_points(block, &mut points);
    }
    if let Some(document) = document {
        microdata_points(document, &mut points);
        table_points(document, &mut points);
        form_points(document, &mut points);
        meta_points(document, &mut points);
    }
    for (i, row) in processed.rows.iter().enumerate() {
        for (key, value) in row {
            points.push(
                StructuredDataPoint::new(key.clone(), value.clone(), DataSource::Derived)
                    .with_context(format!("row {}", i)),
            );
        }
    }

    points.truncate(limit);
    points
}

fn json_ld_points(block: &Value, points: &mut Vec<StructuredDataPoint>) {
    match block {
        Value::Array(items) => items.iter().for_each(|item| json_ld_points(item, points)),
        Value::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                json_ld_points(graph, points);
            }
            let type_name = map
                .get("@type")
                .and_then(|t| match t {
                    Value::String(s) => Some(s.clone()),
                    Value::Array(a) => a.first().and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .unwrap_or_else(|| "Thing".to_string());

            for (key, value) in map.iter().filter(|(k, _)| !k.starts_with('@')) {
                points.push(
                    StructuredDataPoint::new(
                        format!("{}.{}", type_name, key),
                        value.clone(),
                        DataSource::JsonLd,
                    )
                    .with_context("json-ld"),
                );
            }
        }
        _ => {}
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn microdata_points(document: &Html, points: &mut Vec<StructuredDataPoint>) {
    let Ok(selector) = Selector::parse("[itemprop]") else {
        return;
    };
    for element in document.select(&selector) {
        let el = element.value();
        let Some(prop) = el.attr("itemprop") else {
            continue;
        };
        let scope = element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|a| a.value().attr("itemscope").is_some());
        let Some(scope) = scope else {
            continue;
        };
        // Nested scopes are reported through their own properties.
        if el.attr("itemscope").is_some() {
            continue;
        }
        let type_name = scope
            .value()
            .attr("itemtype")
            .and_then(|t| t.rsplit('/').next())
            .unwrap_or("Thing");

        let value = el
            .attr("content")
            .or_else(|| el.attr("datetime"))
            .or_else(|| el.attr("href"))
            .or_else(|| el.attr("src"))
            .map(str::to_string)
            .unwrap_or_else(|| element_text(element));
        if value.is_empty() {
            continue;
        }
        points.push(
            StructuredDataPoint::new(format!("{}.{}", type_name, prop), json!(value), DataSource::Microdata)
                .with_context("microdata"),
        );
    }
}

fn table_points(document: &Html, points: &mut Vec<StructuredDataPoint>) {
    let (Ok(tables), Ok(rows), Ok(cells)) = (
        Selector::parse("table"),
        Selector::parse("tr"),
        Selector::parse("th, td"),
    ) else {
        return;
    };

    for (t, table) in document.select(&tables).enumerate() {
        let mut table_rows = table.select(&rows);
        let Some(header_row) = table_rows.next() else {
            continue;
        };
        let headers: Vec<String> = header_row
            .select(&cells)
            .map(|c| header_key(&element_text(c)))
            .collect();
        if headers.iter().all(String::is_empty) {
            continue;
        }

        for (r, row) in table_rows.take(MAX_TABLE_ROWS).enumerate() {
            for (header, cell) in headers.iter().zip(row.select(&cells)) {
                let value = element_text(cell);
                if header.is_empty() || value.is_empty() {
                    continue;
                }
                points.push(
                    StructuredDataPoint::new(header.clone(), json!(value), DataSource::Table)
                        .with_context(format!("table[{}] row {}", t, r + 1)),
                );
            }
        }
    }
}

/// Label for a form control: `label[for=id]`, then a preceding sibling
/// label, then an enclosing label.
fn form_label(document: &Html, control: ElementRef<'_>) -> Option<String> {
    if let Some(id) = control.value().attr("id") {
        if let Ok(selector) = Selector::parse(&format!("label[for=\"{}\"]", id)) {
            if let Some(label) = document.select(&selector).next() {
                return Some(element_text(label));
            }
        }
    }
    let sibling = control
        .prev_siblings()
        .filter_map(ElementRef::wrap)
        .next()
        .filter(|el| el.value().name() == "label");
    if let Some(label) = sibling {
        return Some(element_text(label));
    }
    control
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "label")
        .map(element_text)
}

fn form_points(document: &Html, points: &mut Vec<StructuredDataPoint>) {
    let (Ok(forms), Ok(controls)) = (
        Selector::parse("form"),
        Selector::parse("input[name], select[name], textarea[name]"),
    ) else {
        return;
    };

    for (f, form) in document.select(&forms).enumerate() {
        for control in form.select(&controls) {
            let el = control.value();
            let input_type = el.attr("type").unwrap_or(el.name());
            if matches!(input_type, "hidden" | "submit" | "button") {
                continue;
            }
            let Some(name) = el.attr("name") else {
                continue;
            };

            let mut field = Map::new();
            field.insert("type".to_string(), json!(input_type));
            field.insert("required".to_string(), json!(el.attr("required").is_some()));
            if let Some(label) = form_label(document, control).filter(|l| !l.is_empty()) {
                field.insert("label".to_string(), json!(label));
            }
            if let Some(action) = form.value().attr("action") {
                field.insert("action".to_string(), json!(action));
            }
            points.push(
                StructuredDataPoint::new(format!("form.{}", name), Value::Object(field), DataSource::Form)
                    .with_context(format!("form[{}]", f)),
            );
        }
    }
}

fn meta_points(document: &Html, points: &mut Vec<StructuredDataPoint>) {
    let Ok(selector) = Selector::parse("meta[content]") else {
        return;
    };
    for meta in document.select(&selector) {
        let el = meta.value();
        let Some(name) = el.attr("name").or_else(|| el.attr("property")) else {
            continue;
        };
        if matches!(name, "viewport" | "robots" | "generator") {
            continue;
        }
        let content = el.attr("content").unwrap_or_default().trim();
        if content.is_empty() {
            continue;
        }
        points.push(
            StructuredDataPoint::new(format!("meta.{}", name), json!(content), DataSource::Html)
                .with_context("meta"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::formats::{process, ContentFormat};
    use crate::types::DataType;

    fn mine(html: &str) -> Vec<StructuredDataPoint> {
        let processed = process(ContentFormat::Html, html).unwrap();
        let document = Html::parse_document(html);
        mine_structured_data(&processed, Some(&document), 500)
    }

    #[test]
    fn json_ld_and_microdata_carry_provenance() {
        let points = mine(
            r#"<html><head><script type="application/ld+json">
                {"@context":"https://schema.org","@type":"Event","name":"Full Council","startDate":"2025-03-12"}
            </script></head><body>
            <div itemscope itemtype="https://schema.org/GovernmentOrganization">
              <span itemprop="name">Anytown Council</span>
            </div></body></html>"#,
        );
        let start = points.iter().find(|p| p.key == "Event.startDate").unwrap();
        assert_eq!(start.source, DataSource::JsonLd);
        assert_eq!(start.confidence, 0.9);
        assert_eq!(start.data_type, DataType::Date);

        let org = points
            .iter()
            .find(|p| p.key == "GovernmentOrganization.name")
            .unwrap();
        assert_eq!(org.confidence, 0.8);
        assert_eq!(org.value, "Anytown Council");
    }

    #[test]
    fn table_rows_use_header_keys() {
        let points = mine(
            r#"<table><tr><th>Supplier</th><th>Amount (£)</th></tr>
               <tr><td>Acme Ltd</td><td>1,200</td></tr></table>"#,
        );
        let supplier = points.iter().find(|p| p.key == "supplier").unwrap();
        assert_eq!(supplier.value, "Acme Ltd");
        assert_eq!(supplier.source, DataSource::Table);
        assert_eq!(supplier.context.as_deref(), Some("table[0] row 1"));
        assert!(points.iter().any(|p| p.key == "amount"));
    }

    #[test]
    fn form_labels_resolved_three_ways() {
        let points = mine(
            r#"<form action="/report">
                 <label for="street">Street name</label><input id="street" name="street">
                 <label>Postcode</label><input name="postcode" required>
                 <label>Email <input name="email" type="email"></label>
                 <input type="hidden" name="token">
               </form>"#,
        );
        let label = |key: &str| {
            points
                .iter()
                .find(|p| p.key == key)
                .map(|p| p.value["label"].clone())
        };
        assert_eq!(label("form.street"), Some(json!("Street name")));
        assert_eq!(label("form.postcode"), Some(json!("Postcode")));
        assert_eq!(label("form.email"), Some(json!("Email")));
        assert!(!points.iter().any(|p| p.key == "form.token"));
    }

    #[test]
    fn document_rows_are_derived() {
        let processed = process(ContentFormat::Csv, "supplier,amount\nAcme,100\n").unwrap();
        let points = mine_structured_data(&processed, None, 500);
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.source == DataSource::Derived));
    }
}
