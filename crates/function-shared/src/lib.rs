//! This crate contains the path addressing helpers shared by the function
//! crates in this workspace: parsing of dot/bracket field paths and reading
//! or writing values at those paths inside JSON trees.

pub mod fieldpath;
