//! Pipeline stages for bill routing.
//!
//! Each submodule implements one transformation step and is testable on its
//! own against the in-memory document backend.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ resolve ──▶ route ──▶ compose
//! (path)    (per page)   (batch)    (batch)   (stamp / sheet / split)
//! ```
//!
//! 1. [`input`]   — validate the user-supplied path (exists, readable, `%PDF`)
//! 2. [`extract`] — page text + spans → [`crate::model::BillRecord`]; pure,
//!    runs per page in parallel. Pattern ladders live in [`fields`].
//! 3. [`resolve`] — repair missing serials from the nearest printed serial
//! 4. [`route`]   — group co-located records and chain stops greedily
//! 5. [`compose`] — copy pages in route order and burn in the serial stamp,
//!    positioned by [`stamp`]; multi-up geometry lives in [`sheet`]

pub mod compose;
pub mod extract;
pub mod fields;
pub mod input;
pub mod resolve;
pub mod route;
pub mod sheet;
pub mod stamp;
