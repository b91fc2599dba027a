//! Document-conversion collaborator: bytes in, text out.
//!
//! The analysis core never inspects file bytes. It asks a
//! [`DocumentConverter`] for text and works on that. Binary formats (PDF,
//! DOCX, PPTX, images) need an external engine plugged in through the
//! trait; [`MarkupConverter`] covers the text-like formats on its own.
//!
//! ```rust,no_run
//! use edgequake_textproc::convert::{read_document, DocumentConverter, MarkupConverter};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let converter = MarkupConverter::default();
//! let doc = read_document("notes.md".as_ref(), converter.max_bytes()).await?;
//! let converted = converter.convert(&doc.name, &doc.bytes, false).await?;
//! println!("{}", converted.text);
//! # Ok(())
//! # }
//! ```

use crate::config::{ProcessorConfig, DEFAULT_MAX_DOCUMENT_BYTES};
use crate::error::ConversionError;
use async_trait::async_trait;
use scraper::{Html, Node};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Extensions the conversion service accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "pdf", "docx", "html", "htm", "pptx", "png", "jpg", "jpeg", "asciidoc", "md", "txt",
];

/// Extensions [`MarkupConverter`] converts without an external engine.
pub const MARKUP_EXTENSIONS: &[&str] = &[
    "md", "markdown", "txt", "asciidoc", "adoc", "html", "htm",
];

/// Lower-cased extension of `name`, without the dot.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// True if `name` has an extension listed in [`SUPPORTED_EXTENSIONS`].
pub fn is_supported_extension(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Shape of the text a converter produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextFormat {
    #[default]
    Markdown,
    Json,
    Yaml,
}

impl fmt::Display for TextFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TextFormat::Markdown => "markdown",
            TextFormat::Json => "json",
            TextFormat::Yaml => "yaml",
        })
    }
}

impl FromStr for TextFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(TextFormat::Markdown),
            "json" => Ok(TextFormat::Json),
            "yaml" | "yml" => Ok(TextFormat::Yaml),
            other => Err(format!(
                "unknown output format '{other}' (expected markdown, json or yaml)"
            )),
        }
    }
}

/// Text extracted from a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertedDocument {
    pub text: String,
    pub format: TextFormat,
}

/// Turns raw document bytes into text.
///
/// `name` is only used for format detection and error messages.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(
        &self,
        name: &str,
        bytes: &[u8],
        use_ocr: bool,
    ) -> Result<ConvertedDocument, ConversionError>;
}

/// A document read from disk, ready for conversion.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Read a file, rejecting unsupported extensions and files over `max_bytes`
/// before loading them.
pub async fn read_document(path: &Path, max_bytes: usize) -> Result<Document, ConversionError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    if !is_supported_extension(&name) {
        return Err(ConversionError::UnsupportedFormat {
            extension: extension_of(&name).unwrap_or_default(),
            name,
        });
    }

    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| ConversionError::Failed {
            name: name.clone(),
            detail: e.to_string(),
        })?;
    let size = usize::try_from(meta.len()).unwrap_or(usize::MAX);
    if size > max_bytes {
        return Err(ConversionError::TooLarge {
            name,
            size,
            limit: max_bytes,
        });
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ConversionError::Failed {
            name: name.clone(),
            detail: e.to_string(),
        })?;
    debug!("Read {} ({} bytes)", path.display(), bytes.len());
    Ok(Document { name, bytes })
}

/// Built-in converter for Markdown, plain text, AsciiDoc and HTML.
///
/// HTML is reduced to its visible text, with headings and list items kept
/// as Markdown. JSON and YAML output wrap the text with its source name.
#[derive(Debug, Clone)]
pub struct MarkupConverter {
    max_bytes: usize,
    format: TextFormat,
}

impl Default for MarkupConverter {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            format: TextFormat::Markdown,
        }
    }
}

#[derive(Serialize)]
struct Export<'a> {
    name: &'a str,
    source_format: &'a str,
    text: &'a str,
}

impl MarkupConverter {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            ..Self::default()
        }
    }

    pub fn from_config(config: &ProcessorConfig) -> Self {
        Self::new(config.max_document_bytes)
    }

    pub fn with_format(mut self, format: TextFormat) -> Self {
        self.format = format;
        self
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    fn render(&self, name: &str, ext: &str, text: String) -> Result<String, ConversionError> {
        let export = Export {
            name,
            source_format: ext,
            text: &text,
        };
        let rendered = match self.format {
            TextFormat::Markdown => return Ok(text.clone()),
            TextFormat::Json => serde_json::to_string_pretty(&export).map_err(|e| e.to_string()),
            TextFormat::Yaml => serde_yaml::to_string(&export).map_err(|e| e.to_string()),
        };
        rendered.map_err(|detail| ConversionError::Failed {
            name: name.to_string(),
            detail,
        })
    }
}

#[async_trait]
impl DocumentConverter for MarkupConverter {
    async fn convert(
        &self,
        name: &str,
        bytes: &[u8],
        use_ocr: bool,
    ) -> Result<ConvertedDocument, ConversionError> {
        if bytes.len() > self.max_bytes {
            return Err(ConversionError::TooLarge {
                name: name.to_string(),
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }

        let ext = extension_of(name).unwrap_or_default();
        if !MARKUP_EXTENSIONS.contains(&ext.as_str()) {
            return Err(ConversionError::UnsupportedFormat {
                name: name.to_string(),
                extension: ext,
            });
        }
        if use_ocr {
            debug!("{}: OCR has no effect on text formats", name);
        }

        let raw = std::str::from_utf8(bytes).map_err(|e| ConversionError::Failed {
            name: name.to_string(),
            detail: format!("not valid UTF-8: {e}"),
        })?;
        let raw = raw.strip_prefix('\u{FEFF}').unwrap_or(raw);

        let text = match ext.as_str() {
            "html" | "htm" => html_to_text(raw),
            _ => raw.replace("\r\n", "\n"),
        };

        Ok(ConvertedDocument {
            text: self.render(name, &ext, text)?,
            format: self.format,
        })
    }
}

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "title"];

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "main", "aside", "nav", "blockquote",
    "pre", "table", "tr", "td", "th", "ul", "ol", "li", "h1", "h2", "h3", "h4", "h5", "h6",
    "dt", "dd", "figcaption",
];

/// Visible text of an HTML document, one block per paragraph.
///
/// Text nodes sharing the nearest block-level ancestor are joined on one
/// line; headings become `#` lines and list items `- ` lines.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut blocks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_block = None;

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let mut block = None;
        let mut skipped = false;
        for ancestor in node.ancestors() {
            if let Some(el) = ancestor.value().as_element() {
                let tag = el.name();
                if SKIPPED_ELEMENTS.contains(&tag) {
                    skipped = true;
                    break;
                }
                if block.is_none() && BLOCK_ELEMENTS.contains(&tag) {
                    block = Some((ancestor.id(), tag));
                }
            }
        }
        if skipped {
            continue;
        }

        let words = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if words.is_empty() {
            continue;
        }

        let block_id = block.map(|(id, _)| id);
        if block_id != current_block && !current.is_empty() {
            blocks.push(std::mem::take(&mut current));
        }
        current_block = block_id;

        if current.is_empty() {
            match block.map(|(_, tag)| tag) {
                Some(h @ ("h1" | "h2" | "h3" | "h4" | "h5" | "h6")) => {
                    let level = h[1..].parse::<usize>().unwrap_or(1);
                    current.push_str(&"#".repeat(level));
                    current.push(' ');
                }
                Some("li") => current.push_str("- "),
                _ => {}
            }
        } else {
            current.push(' ');
        }
        current.push_str(&words);
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks.join("\n\n")
}
