//! Blocking, seekable streams over chunked content.

mod chunked;
pub use chunked::{ChunkedStream,StreamHandle};

mod sink;
pub use sink::{ChunkSink,HEADER_SIZE,HEADER_CDN_URL};

mod halt;
pub use halt::HaltListener;
