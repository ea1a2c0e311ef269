//! services/bot/src/adapters/extract/docx.rs
//!
//! Text from zipped-XML word-processing documents. A raw pass reads the
//! `w:t` runs of `word/document.xml`; if that yields nothing, every text node
//! is rendered into simple HTML by local name and stripped back to text.

use std::io::{Cursor, Read};

use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use zip::ZipArchive;

const DOCUMENT_PART: &str = "word/document.xml";

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum DocxError {
    #[error("invalid zip package: {0}")]
    Package(#[from] zip::result::ZipError),
    #[error("failed to read word/document.xml: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed document XML: {0}")]
    Xml(String),
    #[error("unable to extract text")]
    Empty,
}

impl From<quick_xml::Error> for DocxError {
    fn from(e: quick_xml::Error) -> Self {
        DocxError::Xml(e.to_string())
    }
}

impl From<quick_xml::escape::EscapeError> for DocxError {
    fn from(e: quick_xml::escape::EscapeError) -> Self {
        DocxError::Xml(e.to_string())
    }
}

pub fn extract_docx(bytes: &[u8]) -> Result<String, DocxError> {
    let xml = read_document_xml(bytes)?;

    match raw_text(&xml) {
        Ok(text) if !text.is_empty() => return Ok(text),
        Ok(_) => {}
        Err(e) => tracing::debug!(error = %e, "Raw DOCX pass failed, trying HTML fallback"),
    }

    let text = strip_html(&html_text(&xml)?);
    if text.is_empty() {
        return Err(DocxError::Empty);
    }
    Ok(text)
}

fn read_document_xml(bytes: &[u8]) -> Result<String, DocxError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut xml = String::new();
    archive.by_name(DOCUMENT_PART)?.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Reads `w:t` text, mapping paragraph ends and in-run breaks and tabs.
fn raw_text(xml: &str) -> Result<String, DocxError> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_run = false;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:r" => in_run = true,
                b"w:t" => in_text = true,
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"w:r" => in_run = false,
                b"w:t" => in_text = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" if in_run => out.push('\t'),
                b"w:br" | b"w:cr" if in_run => out.push('\n'),
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => out.push_str(&t.unescape()?),
            Event::CData(t) if in_text => out.push_str(&String::from_utf8_lossy(&t)),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out.trim().to_string())
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Renders paragraphs and text nodes regardless of namespace prefix.
fn html_text(xml: &str) -> Result<String, DocxError> {
    let mut reader = Reader::from_str(xml);
    let mut html = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => html.push_str("<p>"),
                b"t" => in_text = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"p" => html.push_str("</p>"),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"br" => html.push_str("<br />"),
                b"tab" => html.push_str("&nbsp;"),
                _ => {}
            },
            Event::Text(t) if in_text => html.push_str(&escape_html(&t.unescape()?)),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(html)
}

/// Drops tags, decodes the common entities and collapses whitespace.
pub fn strip_html(html: &str) -> String {
    let text = TAG.replace_all(html, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&#x2F;", "/");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn package(document_xml: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("[Content_Types].xml", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"<Types/>").unwrap();
        writer
            .start_file(DOCUMENT_PART, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(document_xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn body(inner: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            inner
        )
    }

    #[test]
    fn raw_pass_keeps_paragraphs_tabs_and_breaks() {
        let xml = body(
            r#"<w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr><w:r><w:t>Hello</w:t><w:tab/><w:t xml:space="preserve">world &amp; more</w:t></w:r></w:p><w:p><w:r><w:t>line</w:t><w:br/><w:t>two</w:t></w:r></w:p>"#,
        );
        let text = extract_docx(&package(&xml)).unwrap();
        assert_eq!(text, "Hello\tworld & more\nline\ntwo");
    }

    #[test]
    fn fallback_reads_text_under_other_prefixes() {
        let xml = r#"<x:document xmlns:x="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><x:body><x:p><x:r><x:t>Fish &lt;&amp;&gt; chips</x:t></x:r></x:p><x:p><x:r><x:t>second   paragraph</x:t></x:r></x:p></x:body></x:document>"#;
        let text = extract_docx(&package(xml)).unwrap();
        assert_eq!(text, "Fish <&> chips second paragraph");
    }

    #[test]
    fn empty_document_is_an_error() {
        let xml = body("<w:p/><w:p><w:r><w:t>   </w:t></w:r></w:p>");
        assert!(matches!(
            extract_docx(&package(&xml)),
            Err(DocxError::Empty)
        ));
    }

    #[test]
    fn missing_document_part_is_an_error() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/styles.xml", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"<w:styles/>").unwrap();
        let bytes = writer.finish().unwrap().into_inner();
        assert!(matches!(extract_docx(&bytes), Err(DocxError::Package(_))));
    }

    #[test]
    fn not_a_zip_is_an_error() {
        assert!(extract_docx(b"plain text, not a package").is_err());
    }

    #[test]
    fn strip_html_decodes_fixed_entity_set() {
        assert_eq!(
            strip_html("<p>a&nbsp;b &#39;c&#x27; d&#x2F;e &quot;f&quot;</p><p>g</p>"),
            "a b 'c' d/e \"f\" g"
        );
    }
}
