//! Pipeline stages for XML-to-PDF conversion.
//!
//! Each submodule implements one transformation step; the orchestrator in
//! [`crate::convert`] runs them strictly in order and every stage returns a
//! new buffer.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ xml ──▶ extract ──▶ template ──▶ render ──▶ stamp ──▶ paginate ──▶ sign
//! (path/URL) (tree)  (context)   (HTML)      (PDF)     (+box)    (+numbers)   (CMS)
//! ```
//!
//! 1. [`input`]    — read a path, URL or upload body into a submission
//! 2. [`xml`]      — parse into an owned element tree
//! 3. [`extract`]  — first-match field lookup into a typed context
//! 4. [`template`] — Tera HTML rendering
//! 5. [`render`]   — HTML to PDF; [`layout`], [`draw`] and [`fonts`] form the
//!    built-in backend, wkhtmltopdf the external one
//! 6. [`stamp`]    — signature box below the last text line
//! 7. [`paginate`] — `Страница N из M` on every page
//! 8. [`sign`]     — detached CMS signature or external signing utility
//!
//! [`overlay`] is shared by 6 and 7; [`placeholder`] builds the error
//! document callers may return for bad input.

pub mod draw;
pub mod extract;
pub mod fonts;
pub mod input;
pub mod layout;
pub mod overlay;
pub mod paginate;
pub mod placeholder;
pub mod render;
pub mod sign;
pub mod stamp;
pub mod template;
pub mod xml;
