//! Pipeline stages for SOC report analysis.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different model transport) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! reader ──▶ rows ──▶ tables ──▶ serialize ──▶ chunk ──▶ llm ──▶ normalize ──▶ parse
//! (pdfium)  (lines)  (grids)    (<table>)     (split)   (call)  (envelope)    (record)
//!                                               ▲                                │
//!                                               └──────────── merge ◀────────────┘
//! ```
//!
//! 1. [`reader`]    — glyphs and page text from pdfium; runs in `spawn_blocking`
//! 2. [`rows`]      — cluster glyphs into visual lines
//! 3. [`tables`]    — find runs of aligned lines and materialise tables
//! 4. [`serialize`] — render tables as markup for the prompt
//! 5. [`chunk`]     — split oversized text, drive chunks in order, merge results
//! 6. [`llm`]       — one model call with timeout and retry/backoff; the only
//!    stage with network I/O, through a [`transport`]
//! 7. [`normalize`] — pull the text payload out of the response envelope
//! 8. [`parse`]     — structural strategies, then [`fallback`] extraction

pub mod chunk;
pub mod fallback;
pub mod llm;
pub mod normalize;
pub mod parse;
pub mod reader;
pub mod rows;
pub mod serialize;
pub mod tables;
pub mod transport;
