//! Source buffers and locations.
//!
//! A `Location` is a byte range into a named source buffer. Views into
//! the buffer are borrowed, never copied, and the span-union operator
//! produces the smallest range covering both operands. Synthetic
//! locations (for nodes a rule effect invents) wrap an owned string in
//! an unnamed buffer so the rest of the engine never has to distinguish
//! the two cases.
//!
//! Comparison, ordering and hashing are all by the text the span
//! denotes. Symbol tables key their bindings by `Location`, and trees
//! parsed from different buffers must compare equal when their text
//! does, so identity of the backing buffer deliberately does not
//! participate.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::rc::Rc;

/// An immutable, named source buffer.
#[derive(Debug)]
pub struct Source {
    name: String,
    contents: String,
}

/// Shared handle to a source buffer.
pub type SourceRef = Rc<Source>;

impl Source {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> SourceRef {
        Rc::new(Source {
            name: name.into(),
            contents: contents.into(),
        })
    }

    /// A buffer with no origin, used for synthetic text.
    pub fn synthetic(contents: impl Into<String>) -> SourceRef {
        Source::new("", contents)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn view(&self, span: Range<usize>) -> &str {
        &self.contents[span]
    }
}

/// A byte range into a source buffer, or the unit location.
#[derive(Clone, Default)]
pub struct Location {
    source: Option<SourceRef>,
    span: Range<usize>,
}

impl Location {
    pub fn new(source: &SourceRef, span: Range<usize>) -> Location {
        Location {
            source: Some(Rc::clone(source)),
            span,
        }
    }

    /// A location denoting `text` with no source origin.
    pub fn synthetic(text: impl Into<String>) -> Location {
        let text = text.into();
        let len = text.len();
        Location {
            source: Some(Source::synthetic(text)),
            span: 0..len,
        }
    }

    /// The unit location: no buffer, empty range.
    pub fn none() -> Location {
        Location::default()
    }

    pub fn is_none(&self) -> bool {
        self.source.is_none()
    }

    pub fn source(&self) -> Option<&SourceRef> {
        self.source.as_ref()
    }

    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    /// Borrowed view of the denoted text. The unit location views as "".
    pub fn view(&self) -> &str {
        match &self.source {
            Some(source) => source.view(self.span.clone()),
            None => "",
        }
    }

    /// Span union: the smallest range containing both operands.
    ///
    /// If either side is the unit location the other wins; if the two
    /// refer to different buffers the receiver wins.
    pub fn join(&self, other: &Location) -> Location {
        match (&self.source, &other.source) {
            (None, _) => other.clone(),
            (_, None) => self.clone(),
            (Some(a), Some(b)) => {
                if Rc::ptr_eq(a, b) {
                    Location {
                        source: Some(Rc::clone(a)),
                        span: self.span.start.min(other.span.start)
                            ..self.span.end.max(other.span.end),
                    }
                } else {
                    self.clone()
                }
            }
        }
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Location) -> bool {
        self.view() == other.view()
    }
}

impl Eq for Location {}

impl PartialOrd for Location {
    fn partial_cmp(&self, other: &Location) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Location {
    fn cmp(&self, other: &Location) -> Ordering {
        self.view().cmp(other.view())
    }
}

impl Hash for Location {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.view().hash(state);
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(
                f,
                "{}:{}..{}({:?})",
                source.name(),
                self.span.start,
                self.span.end,
                self.view()
            ),
            None => f.write_str("<none>"),
        }
    }
}
