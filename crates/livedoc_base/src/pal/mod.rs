/* 📖 # Why does the platform abstraction layer cover watches and HTTP?

Everything the live-sync core touches outside the process goes through this module:
reading files, walking project trees, OS change notifications and the HTTP listener.
The engine only ever sees `PalHandle`, so tests swap in `MockPal` and drive
watch events and requests by hand.
*/

mod file_path;
pub mod http;
pub mod mock;
pub mod real_pal;
mod traits;

pub use file_path::FilePath;
pub use mock::MockPal;
pub use real_pal::RealPal;
pub use traits::{
    FileChangeCallback, FileChangeEvent, Pal, PalHandle, WalkEntry, WalkOptions, WatchHandle,
};
