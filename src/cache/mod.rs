//! Process-lifetime caches for local repository reads
//!
//! Caches are created empty, filled lazily and never flushed as a whole.
//!
//! | Entry | Stored outcome |
//! |-------|----------------|
//! | Manifest | parsed manifest or the read/parse error |
//! | File list | sorted relative paths or the listing error |
//! | Hash exists | `true` only, a miss is re-probed |
//! | Hash value | base64 text or the read error |
//! | Access time | whether the path has been touched |

pub mod local_files;
pub mod memo;

pub use local_files::LocalMetadataCache;
pub use memo::{ExistenceProbe, MemoCell};
