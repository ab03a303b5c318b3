//! Parsers turning raw tile bytes into [`ModelDocument`]s.
//!
//! Parsing never fails loudly: every parser reports through a
//! [`ParseOutcome`], and a missing document simply means the tile renders
//! nothing.

use std::path::PathBuf;

use crate::data_structures::document::ModelDocument;

pub mod b3dm;
pub mod gltf;

pub use self::b3dm::B3dmParser;
pub use self::gltf::GltfParser;

/// Where external buffers and images referenced by relative URIs live.
#[derive(Clone, Debug, Default)]
pub struct ParseOptions {
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub document: Option<ModelDocument>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ParseOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            document: None,
            errors: vec![error.into()],
            warnings: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Bytes in, document (or diagnostics) out. Implementations must be pure and
/// callable from any thread.
pub trait ModelDocumentParser: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap check on the leading bytes and the URL the bytes came from.
    fn accepts(&self, bytes: &[u8], url: &str) -> bool;

    fn parse(&self, bytes: &[u8], options: &ParseOptions) -> ParseOutcome;
}

/// The set of tile content parsers, tried in registration order.
#[derive(Default)]
pub struct ContentRegistry {
    parsers: Vec<Box<dyn ModelDocumentParser>>,
}

impl ContentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// b3dm first, then glTF (binary or JSON).
    pub fn with_default_parsers() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(B3dmParser));
        registry.register(Box::new(GltfParser));
        registry
    }

    pub fn register(&mut self, parser: Box<dyn ModelDocumentParser>) {
        log::debug!("Registered {} content parser", parser.name());
        self.parsers.push(parser);
    }

    pub fn parser_names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    pub fn parse(&self, bytes: &[u8], url: &str, options: &ParseOptions) -> ParseOutcome {
        match self.parsers.iter().find(|p| p.accepts(bytes, url)) {
            Some(parser) => {
                log::trace!("Parsing {} ({} bytes) as {}", url, bytes.len(), parser.name());
                let outcome = parser.parse(bytes, options);
                for error in &outcome.errors {
                    log::error!("{}: {}", url, error);
                }
                outcome
            }
            None => ParseOutcome::failed(format!("No content parser accepts '{}'", url)),
        }
    }
}

impl std::fmt::Debug for ContentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.parser_names()).finish()
    }
}

/// Lower-cased extension of the path part of a URL.
pub(crate) fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    file.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
}
