//! General errors that can occur.

mod chunk;
pub use chunk::ChunkError;

mod transport;
pub use transport::TransportError;

mod load;
pub use load::LoadError;

mod decoder;
pub use decoder::DecodeError;

mod output;
pub use output::OutputError;

mod session;
pub use session::SessionError;

mod error;
pub use error::TandemError;
