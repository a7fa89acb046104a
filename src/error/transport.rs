//---------------------------------------------------------------------------------------------------- TransportError
#[derive(thiserror::Error, Debug)]
/// Errors of the storage channel framing.
///
/// These are about the shared connection itself,
/// not about any one chunk.
pub enum TransportError {
	#[error("packet is truncated, needed {needed} bytes, got {got}")]
	/// An inbound packet was shorter than its framing requires
	Truncated {
		/// Bytes required
		needed: usize,
		/// Bytes present
		got: usize,
	},

	#[error("failed to send packet: {0}")]
	/// The connection refused an outbound packet
	Send(std::borrow::Cow<'static, str>),

	#[error("connection io error: {0}")]
	/// The connection failed
	Io(#[from] std::io::Error),

	#[error("the channel multiplexer is closed")]
	/// The multiplexer was closed
	Closed,
}
