//! Core analysis logic for folioscan.
//!
//! Turns the ordered image list of a digitized work into its physical page
//! sequence and logical structure: filenames are classified
//! ([`classify`]), turned into pages and structure nodes ([`builder`]),
//! optionally regrouped into the canonical section order ([`reorder`]), and
//! the whole run is driven end to end by [`pipeline`].

pub mod builder;
pub mod classify;
pub mod guard;
pub mod journal;
pub mod pipeline;
pub mod reorder;
