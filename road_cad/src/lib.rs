//! Core library for road corridor engineering: survey point sets,
//! triangulated terrain surfaces, horizontal and vertical alignments,
//! cross-section sampling and earthwork quantities.

pub mod alignment;
pub mod cancel;
pub mod corridor;
pub mod dtm;
pub mod earthworks;
pub mod geometry;
pub mod pointset;
