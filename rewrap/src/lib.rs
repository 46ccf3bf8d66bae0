//! A simple crate providing concurrent text rewrapping features.
//!
//! Several text files are read, have their whitespaces normalized and their lines rewrapped to a fixed width, then
//! are written to an output directory. Each file is worked on in its own task so that independent files are
//! processed in parallel and written out as soon as each one completes.
//!
//! It is a plain _fan-out/fan-in_ pattern: N independent producer tasks each transform one input and push their
//! result through a shared _multi-producer single-consumer_ `mpsc` channel, while a single consumer drains that
//! channel and sequentially writes the results in whatever order the producers finish.
//!
//! ```text
//!     - input dir                       - output dir
//!       L at_the_mountains_of_madness.txt   L {formatted length}.txt
//!       L the_shadow_over_innsmouth.txt     L {formatted length}.txt
//!       L the_call_of_cthulhu.txt           L {formatted length}.txt
//! ```
//!
//! Output files are named after the length of their formatted contents, meaning two texts with formatted contents of
//! the same length are written to the very same file, the last completed one overwriting the other.

mod dispatch;
pub use dispatch::*;

pub mod format;
pub mod task;
