
use pulldown_cmark::{Event, Parser, TagEnd};
use quick_xml::Reader;
use quick_xml::events::Event as XmlEvent;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

const DOCX_BODY_PART: &str = "word/document.xml";

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Unsupported document format: {0}")]
    Unsupported(String),
    #[error("Corrupt document archive: {0}")]
    Archive(String),
    #[error("Malformed document XML: {0}")]
    Xml(String),
    #[error("Document is not valid UTF-8: {0}")]
    Encoding(String),
}

/// Supported source formats, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Docx,
    Markdown,
    PlainText,
}

impl DocumentFormat {
    #[inline]
    pub fn from_path(path: &Path) -> Result<Self, ExtractionError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "docx" => Ok(Self::Docx),
            "md" | "markdown" => Ok(Self::Markdown),
            "txt" | "text" => Ok(Self::PlainText),
            _ => Err(ExtractionError::Unsupported(path.display().to_string())),
        }
    }
}

/// Extract the plain text of a document on disk
#[inline]
pub fn extract(path: &Path) -> Result<String, ExtractionError> {
    let format = DocumentFormat::from_path(path)?;
    let io_error = |source| ExtractionError::Io {
        path: path.display().to_string(),
        source,
    };

    let text = match format {
        DocumentFormat::Docx => {
            let file = File::open(path).map_err(io_error)?;
            extract_docx(BufReader::new(file))?
        }
        DocumentFormat::Markdown => {
            let source = std::fs::read_to_string(path).map_err(io_error)?;
            markdown_to_text(&source)
        }
        DocumentFormat::PlainText => std::fs::read_to_string(path).map_err(io_error)?,
    };

    debug!(
        "Extracted {} characters from {} ({:?})",
        text.chars().count(),
        path.display(),
        format
    );

    Ok(text)
}

/// Extract paragraph text from a .docx archive
#[inline]
pub fn extract_docx<R: Read + std::io::Seek>(reader: R) -> Result<String, ExtractionError> {
    let mut archive =
        zip::ZipArchive::new(reader).map_err(|e| ExtractionError::Archive(e.to_string()))?;

    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY_PART)
        .map_err(|e| ExtractionError::Archive(format!("{}: {}", DOCX_BODY_PART, e)))?
        .read_to_string(&mut xml)
        .map_err(|e| ExtractionError::Encoding(e.to_string()))?;

    docx_xml_to_text(&xml)
}

/// Walk WordprocessingML and keep run text, tabs and breaks.
/// Each paragraph becomes one line followed by a blank line.
#[inline]
pub fn docx_xml_to_text(xml: &str) -> Result<String, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(XmlEvent::Start(element)) => {
                if element.name().as_ref() == b"w:t" {
                    in_text_run = true;
                }
            }
            Ok(XmlEvent::End(element)) => match element.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => text.push_str("\n\n"),
                _ => {}
            },
            Ok(XmlEvent::Empty(element)) => match element.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" | b"w:cr" => text.push('\n'),
                _ => {}
            },
            Ok(XmlEvent::Text(content)) if in_text_run => {
                let content = content
                    .unescape()
                    .map_err(|e| ExtractionError::Xml(e.to_string()))?;
                text.push_str(&content);
            }
            Ok(XmlEvent::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ExtractionError::Xml(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        }
    }

    Ok(text.trim_end().to_string())
}

/// Render markdown to plain text, keeping block structure as line breaks
#[inline]
pub fn markdown_to_text(source: &str) -> String {
    let mut text = String::new();

    for event in Parser::new(source) {
        match event {
            Event::Text(content) | Event::Code(content) => text.push_str(&content),
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::CodeBlock
                | TagEnd::BlockQuote(_)
                | TagEnd::Table,
            ) => text.push_str("\n\n"),
            Event::End(TagEnd::Item | TagEnd::TableRow | TagEnd::TableHead) => text.push('\n'),
            Event::End(TagEnd::TableCell) => text.push('\t'),
            _ => {}
        }
    }

    text.trim_end().to_string()
}
