//! Format detection and per-format normalization.

use quick_xml::events::Event;
use quick_xml::Reader;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ExtractionError;

/// Rows taken from JSON or CSV documents.
const MAX_DOCUMENT_ROWS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentFormat {
    Html,
    Json,
    Xml,
    Pdf,
    Csv,
    Excel,
}

impl ContentFormat {
    /// Pick a format from the declared content type, falling back to the URL
    /// extension and finally to sniffing the body.
    pub fn detect(content_type: &str, url: &str, content: &str) -> Self {
        let ct = content_type.to_lowercase();
        if ct.contains("html") {
            return ContentFormat::Html;
        }
        if ct.contains("json") {
            return ContentFormat::Json;
        }
        if ct.contains("xml") || ct.contains("rss") || ct.contains("atom") {
            return ContentFormat::Xml;
        }
        if ct.contains("pdf") {
            return ContentFormat::Pdf;
        }
        if ct.contains("csv") {
            return ContentFormat::Csv;
        }
        if ct.contains("spreadsheet") || ct.contains("excel") {
            return ContentFormat::Excel;
        }

        let path = url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_lowercase();
        match path.rsplit('.').next() {
            Some("json") => return ContentFormat::Json,
            Some("xml") | Some("rss") | Some("atom") => return ContentFormat::Xml,
            Some("pdf") => return ContentFormat::Pdf,
            Some("csv") => return ContentFormat::Csv,
            Some("xls") | Some("xlsx") | Some("ods") => return ContentFormat::Excel,
            _ => {}
        }

        let head = content.trim_start();
        if head.starts_with("<?xml") || head.starts_with("<rss") || head.starts_with("<urlset") {
            ContentFormat::Xml
        } else if head.starts_with('{') || head.starts_with('[') {
            ContentFormat::Json
        } else if head.starts_with("%PDF") {
            ContentFormat::Pdf
        } else {
            ContentFormat::Html
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentFormat::Html => "html",
            ContentFormat::Json => "json",
            ContentFormat::Xml => "xml",
            ContentFormat::Pdf => "pdf",
            ContentFormat::Csv => "csv",
            ContentFormat::Excel => "excel",
        }
    }

    /// Formats handled by a placeholder processor.
    pub fn is_stub(&self) -> bool {
        matches!(self, ContentFormat::Pdf | ContentFormat::Excel)
    }
}

/// Content normalized for extraction, independent of the source format.
///
/// HTML is kept as markup and re-parsed where needed, since parsed
/// documents cannot cross await points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedContent {
    pub text_content: String,
    pub markup: Option<String>,
    /// JSON-LD blocks or whole JSON-LD documents.
    pub embedded_structured_data: Vec<Value>,
    /// Records from JSON or CSV documents.
    pub rows: Vec<Map<String, Value>>,
    pub metadata: Map<String, Value>,
}

impl ProcessedContent {
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(Value::as_str)
    }

    pub fn word_count(&self) -> usize {
        self.text_content.split_whitespace().count()
    }
}

/// Normalize `content` according to `format`.
pub fn process(format: ContentFormat, content: &str) -> Result<ProcessedContent, ExtractionError> {
    if content.trim().is_empty() {
        return Err(ExtractionError::EmptyContent);
    }

    let mut processed = match format {
        ContentFormat::Html => process_html(content),
        ContentFormat::Json => process_json(content)?,
        ContentFormat::Xml => process_xml(content)?,
        ContentFormat::Csv => process_csv(content),
        ContentFormat::Pdf => process_pdf(content),
        ContentFormat::Excel => ProcessedContent {
            metadata: stub_metadata(content),
            ..Default::default()
        },
    };
    processed
        .metadata
        .insert("format".to_string(), json!(format.as_str()));
    Ok(processed)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of a document, skipping scripts and styles.
pub fn visible_text(document: &Html) -> String {
    let Ok(body) = Selector::parse("body") else {
        return String::new();
    };
    let root = document
        .select(&body)
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut parts = Vec::new();
    for node in root.descendants() {
        if let Some(text) = node.value().as_text() {
            let hidden = node
                .ancestors()
                .filter_map(scraper::ElementRef::wrap)
                .any(|el| matches!(el.value().name(), "script" | "style" | "noscript" | "template"));
            if !hidden {
                parts.push(text.to_string());
            }
        }
    }
    collapse_whitespace(&parts.join(" "))
}

fn process_html(content: &str) -> ProcessedContent {
    let document = Html::parse_document(content);
    let mut metadata = Map::new();

    if let Ok(selector) = Selector::parse("title") {
        if let Some(title) = document
            .select(&selector)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty())
        {
            metadata.insert("title".to_string(), json!(title));
        }
    }
    if let Ok(selector) = Selector::parse("meta[name][content], meta[property][content]") {
        for meta in document.select(&selector) {
            let el = meta.value();
            let name = el.attr("name").or_else(|| el.attr("property")).unwrap_or_default();
            let key = match name.to_lowercase().as_str() {
                "description" | "og:description" => "description",
                "keywords" => "keywords",
                "og:title" => "og_title",
                "dc.date" | "article:published_time" | "dcterms.modified" => "published",
                _ => continue,
            };
            if let Some(value) = el.attr("content") {
                metadata.entry(key.to_string()).or_insert_with(|| json!(value.trim()));
            }
        }
    }
    if let Ok(selector) = Selector::parse("link[rel=canonical][href]") {
        if let Some(href) = document.select(&selector).next().and_then(|el| el.value().attr("href")) {
            metadata.insert("canonical".to_string(), json!(href));
        }
    }
    if let Ok(selector) = Selector::parse("html[lang]") {
        if let Some(lang) = document.select(&selector).next().and_then(|el| el.value().attr("lang")) {
            metadata.insert("lang".to_string(), json!(lang));
        }
    }

    let mut embedded = Vec::new();
    if let Ok(selector) = Selector::parse(r#"script[type="application/ld+json"]"#) {
        for script in document.select(&selector) {
            let raw = script.text().collect::<String>();
            match serde_json::from_str::<Value>(raw.trim()) {
                Ok(Value::Array(items)) => embedded.extend(items),
                Ok(value) => embedded.push(value),
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping malformed JSON-LD block");
                }
            }
        }
    }

    ProcessedContent {
        text_content: visible_text(&document),
        markup: Some(content.to_string()),
        embedded_structured_data: embedded,
        rows: Vec::new(),
        metadata,
    }
}

fn flatten_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Number(n) => out.push(n.to_string()),
        Value::Array(items) => items.iter().for_each(|v| flatten_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| flatten_strings(v, out)),
        _ => {}
    }
}

fn process_json(content: &str) -> Result<ProcessedContent, ExtractionError> {
    let value: Value = serde_json::from_str(content)?;

    let mut parts = Vec::new();
    flatten_strings(&value, &mut parts);

    let is_json_ld = |v: &Value| v.get("@context").is_some() || v.get("@type").is_some();
    let mut processed = ProcessedContent {
        text_content: collapse_whitespace(&parts.join(" ")),
        ..Default::default()
    };

    match value {
        Value::Object(ref map) if is_json_ld(&value) => {
            processed.embedded_structured_data.push(Value::Object(map.clone()));
        }
        Value::Object(map) => {
            // Common API envelopes wrap the records.
            let nested = ["data", "items", "results", "records"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_array));
            match nested {
                Some(items) => processed.rows.extend(
                    items
                        .iter()
                        .filter_map(|v| v.as_object().cloned())
                        .take(MAX_DOCUMENT_ROWS),
                ),
                None => processed.rows.push(map),
            }
        }
        Value::Array(items) => {
            for item in items.into_iter().take(MAX_DOCUMENT_ROWS) {
                match item {
                    Value::Object(map) if map.contains_key("@type") => {
                        processed.embedded_structured_data.push(Value::Object(map))
                    }
                    Value::Object(map) => processed.rows.push(map),
                    _ => {}
                }
            }
        }
        _ => {}
    }

    processed
        .metadata
        .insert("rows".to_string(), json!(processed.rows.len()));
    Ok(processed)
}

fn process_xml(content: &str) -> Result<ProcessedContent, ExtractionError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut root: Option<String> = None;
    let mut current: Option<String> = None;
    let mut texts = Vec::new();
    let mut urls = Vec::new();
    let mut items = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if root.is_none() {
                    root = Some(name.clone());
                }
                if matches!(name.as_str(), "item" | "entry" | "url" | "sitemap") {
                    items += 1;
                }
                current = Some(name);
            }
            Ok(Event::Empty(e)) => {
                // Atom links carry the target in an attribute.
                if e.local_name().as_ref() == b"link" {
                    if let Some(href) = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"href")
                        .and_then(|a| a.unescape_value().ok())
                    {
                        urls.push(href.to_string());
                    }
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| ExtractionError::XmlParse(err.to_string()))?
                    .to_string();
                if matches!(current.as_deref(), Some("loc") | Some("link")) {
                    urls.push(text.trim().to_string());
                }
                texts.push(text);
            }
            Ok(Event::CData(e)) => {
                texts.push(String::from_utf8_lossy(&e.into_inner()).to_string());
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ExtractionError::XmlParse(format!(
                    "at position {}: {}",
                    reader.error_position(),
                    e
                )))
            }
        }
    }

    let mut metadata = Map::new();
    if let Some(root) = root {
        metadata.insert("root".to_string(), json!(root));
    }
    metadata.insert("items".to_string(), json!(items));
    metadata.insert("urls".to_string(), json!(urls));

    Ok(ProcessedContent {
        text_content: collapse_whitespace(&texts.join(" ")),
        metadata,
        ..Default::default()
    })
}

/// Split one CSV line, honouring double-quoted fields.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field).trim().to_string()),
            _ => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

fn process_csv(content: &str) -> ProcessedContent {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let headers: Vec<String> = lines
        .next()
        .map(split_csv_line)
        .unwrap_or_default()
        .into_iter()
        .map(|h| header_key(&h))
        .collect();

    let mut rows = Vec::new();
    for line in lines.take(MAX_DOCUMENT_ROWS) {
        let mut row = Map::new();
        for (header, value) in headers.iter().zip(split_csv_line(line)) {
            if !header.is_empty() && !value.is_empty() {
                row.insert(header.clone(), json!(value));
            }
        }
        if !row.is_empty() {
            rows.push(row);
        }
    }

    let mut metadata = Map::new();
    metadata.insert("columns".to_string(), json!(headers));
    metadata.insert("rows".to_string(), json!(rows.len()));

    ProcessedContent {
        text_content: collapse_whitespace(&content.replace(',', " ")),
        rows,
        metadata,
        ..Default::default()
    }
}

/// Snake-case key for a column or table header.
pub fn header_key(header: &str) -> String {
    crate::similarity::normalize_text(header).replace(' ', "_")
}

fn stub_metadata(content: &str) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("stub".to_string(), json!(true));
    metadata.insert("bytes".to_string(), json!(content.len()));
    metadata
}

/// Placeholder PDF processing: literal strings from text-showing operators.
fn process_pdf(content: &str) -> ProcessedContent {
    let mut texts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in content.chars() {
        match c {
            '(' => {
                depth += 1;
                if depth == 1 {
                    current.clear();
                    continue;
                }
            }
            ')' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if current.chars().filter(|c| c.is_alphanumeric()).count() >= 3 {
                        texts.push(current.clone());
                    }
                    continue;
                }
            }
            _ => {}
        }
        if depth > 0 {
            current.push(c);
        }
    }

    ProcessedContent {
        text_content: collapse_whitespace(&texts.join(" ")),
        metadata: stub_metadata(content),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_from_content_type_then_extension() {
        assert_eq!(
            ContentFormat::detect("text/html; charset=utf-8", "https://a.test/", ""),
            ContentFormat::Html
        );
        assert_eq!(
            ContentFormat::detect("application/octet-stream", "https://a.test/data.csv", ""),
            ContentFormat::Csv
        );
        assert_eq!(
            ContentFormat::detect("", "https://a.test/feed", "<?xml version=\"1.0\"?><rss/>"),
            ContentFormat::Xml
        );
    }

    #[test]
    fn html_keeps_markup_and_json_ld() {
        let html = r#"<html lang="en"><head><title>Agenda</title>
            <script type="application/ld+json">{"@type":"Event","name":"Full Council"}</script>
            <style>.x{}</style></head>
            <body><h1>Full Council</h1><script>var x = 1;</script></body></html>"#;
        let processed = process(ContentFormat::Html, html).unwrap();
        assert_eq!(processed.title(), Some("Agenda"));
        assert_eq!(processed.text_content, "Full Council");
        assert_eq!(processed.embedded_structured_data.len(), 1);
        assert_eq!(processed.metadata["lang"], "en");
        assert!(processed.markup.is_some());
    }

    #[test]
    fn json_envelope_becomes_rows() {
        let processed =
            process(ContentFormat::Json, r#"{"data":[{"supplier":"Acme","amount":"500"}]}"#).unwrap();
        assert_eq!(processed.rows.len(), 1);
        assert_eq!(processed.rows[0]["supplier"], "Acme");
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            process(ContentFormat::Json, "{not json"),
            Err(ExtractionError::JsonParse(_))
        ));
    }

    #[test]
    fn sitemap_urls_are_collected() {
        let xml = r#"<?xml version="1.0"?><urlset><url><loc>https://a.test/one</loc></url>
            <url><loc>https://a.test/two</loc></url></urlset>"#;
        let processed = process(ContentFormat::Xml, xml).unwrap();
        assert_eq!(processed.metadata["root"], "urlset");
        assert_eq!(processed.metadata["items"], 2);
        assert_eq!(processed.metadata["urls"][1], "https://a.test/two");
    }

    #[test]
    fn csv_rows_keyed_by_header() {
        let csv = "Supplier Name,Amount\n\"Acme, Ltd\",\"£1,000\"\nBeta,20\n";
        let processed = process(ContentFormat::Csv, csv).unwrap();
        assert_eq!(processed.rows.len(), 2);
        assert_eq!(processed.rows[0]["supplier_name"], "Acme, Ltd");
        assert_eq!(processed.rows[0]["amount"], "£1,000");
    }

    #[test]
    fn empty_content_is_rejected() {
        assert!(matches!(
            process(ContentFormat::Html, "   "),
            Err(ExtractionError::EmptyContent)
        ));
    }
}
