//! Chunk transports.
//!
//! Both backends implement "fetch chunk N of content X" and deliver
//! into a [`crate::stream::ChunkSink`], running their blocking work
//! on a [`FetchPool`].

mod pool;
pub use pool::FetchPool;

mod packet;
pub use packet::PacketType;

mod channel;
pub use channel::{ChannelMultiplexer,PacketSender};

mod cdn_url;
pub use cdn_url::CdnUrl;

mod cdn;
pub use cdn::CdnChunkFetcher;

mod cache;
pub use cache::{ChunkCache,MemoryCache};

mod transport;
pub use transport::{Transport,ChunkSource};
