//! Output generation for merged catalogs and the README.
//!
//! # Submodules
//!
//! - [`json`]: Writes per-category and aggregate catalogs under the envelope
//! - [`readme`]: Renders the link tables and splices them into `README.md`
//!
//! # Output Structure
//!
//! ```text
//! root/
//! ├── dist/
//! │   ├── <tag>.json
//! │   └── all.json
//! ├── source/
//! │   └── <tag>/<file>.json   # raw feed cache
//! ├── README.md
//! └── log
//! ```

pub mod json;
pub mod readme;
