#![warn(rust_2018_idioms)]

//! Validation of CFF font programs embedded in OpenType fonts.
//!
//! The CFF table is walked structurally (header, INDEXes, DICTs, charsets, FDSelect) and then
//! every glyph's Type 2 charstring is checked by a static interpreter. A table is either accepted
//! as is or rejected; nothing is rewritten.
//!
//! ```no_run
//! # fn load(path: &str) -> Vec<u8> { std::fs::read(path).unwrap() }
//! let data = load("font.cff");
//! match cff_sanitizer::cff::sanitize(&data, 512) {
//!     Ok(sanitized) => println!("accepted {}", sanitized.name),
//!     Err(err) => println!("rejected: {}", err),
//! }
//! ```

/// Reading of binary data.
pub mod binary;
pub mod cff;
pub mod error;
pub mod size;
