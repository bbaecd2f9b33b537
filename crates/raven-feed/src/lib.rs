//! Raven feed core.
//!
//! Turns pages of messages into the flat row list a virtualized chat view
//! consumes: date separators, system rows, height hints and renderer
//! dispatch. Everything here is synchronous and free of I/O; fetching and
//! caching live in `raven-client`.

pub mod assembler;
pub mod filter;
pub mod height;
pub mod pagination;
pub mod render;
pub mod row;
pub mod text;

pub use assembler::{FeedAssembler, PageRequest, interleave_dates};
pub use filter::ListFilter;
pub use height::{HeightModel, estimate_height, estimate_height_with};
pub use pagination::{PageState, Pager};
pub use render::{AuxKey, PlainTextRenderer, PollView, RowKind, RowRenderer, render_row};
pub use row::RenderRow;
