/* 📖 # Why have livedoc_base as a core library?
livedoc_base provides the error type, tracing setup and the platform abstraction layer
used by the engine and the CLI. Keeping them here prevents circular dependencies
between crates and keeps every OS-touching call behind one trait.
*/

pub mod error;
pub mod pal;
pub mod tracing;

// Re-export commonly used types for convenience
pub use error::{LivedocError, LivedocResult, ResultExt};
pub use pal::{
    FileChangeCallback, FileChangeEvent, FilePath, MockPal, Pal, PalHandle, RealPal, WalkEntry,
    WalkOptions, WatchHandle,
};
