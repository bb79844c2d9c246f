//! Document tree engine
//!
//! A mutable, ordered DOM tree plus the algorithms that keep it consistent:
//! structural mutation, bubbling change notification, canonical addressing
//! and browser-like rendered text.
//!
//! ## Philosophy
//!
//! - **Data structures first**: one arena, nodes linked by generational ids
//! - **No special cases**: explicit `last_child`, no circular back link
//! - **Validate, then mutate**: a rejected call leaves the tree unchanged
//!
//! ## Core Design
//!
//! ```text
//! JSON ──DomService──▶ DomArena ◀──mutation── caller
//!                         │  └──events──▶ listeners (bubbling)
//!                         ├──text────────▶ rendered text
//!                         └──serializer──▶ indented XML / XPath
//! ```
//!
//! ```
//! use dom_core::DomArena;
//!
//! let mut arena = DomArena::new();
//! let doc = arena.create_document();
//! let p = arena.create_element(Some(doc), "p")?;
//! let text = arena.create_text(Some(doc), "  Hello   world ")?;
//! arena.append_child(doc, p)?;
//! arena.append_child(p, text)?;
//!
//! assert_eq!(arena.as_text(doc)?, "Hello world");
//! assert_eq!(arena.canonical_xpath(p)?, "/p");
//! # Ok::<(), dom_core::DomError>(())
//! ```

pub mod arena;
pub mod error;
pub mod events;
pub mod mutation;
pub mod serializer;
pub mod service;
pub mod style;
pub mod text;
pub mod types;

pub use arena::{Children, Descendants, DomArena};
pub use error::{DomError, Result};
pub use events::{
    ChangeKind, DomChangeEvent, DomChangeListener, ListenerError, ListenerHandle, ListenerList,
    ListenerRegistry,
};
pub use serializer::{DomSerializer, SerializerConfig};
pub use service::{DomService, DomServiceConfig};
pub use style::{
    DisplayValue, DocumentServices, ElementClassifier, HostObjectFactory, HtmlClassifier,
    InlineStyleResolver, StyleResolver, VisibilityValue,
};
pub use types::*;
