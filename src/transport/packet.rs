//! Packet types of the storage channel protocol.

//---------------------------------------------------------------------------------------------------- Use
use strum::{
	AsRefStr,
	Display,
	FromRepr,
	IntoStaticStr,
};

//---------------------------------------------------------------------------------------------------- PacketType
/// The packet types [`crate::transport::ChannelMultiplexer`] sends and handles.
///
/// ```rust
/// # use tandem::transport::PacketType;
/// assert_eq!(PacketType::from_repr(0x09), Some(PacketType::StreamChunkRes));
/// assert_eq!(PacketType::StreamChunk as u8, 0x08);
/// assert_eq!(PacketType::from_repr(0xff), None);
/// ```
#[derive(Copy,Clone,Debug,PartialEq,Eq,Hash)]
#[derive(AsRefStr,Display,FromRepr,IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum PacketType {
	/// Outbound chunk request.
	StreamChunk = 0x08,
	/// Inbound response fragment: `u16 channel` + payload.
	StreamChunkRes = 0x09,
	/// Inbound channel failure: `u16 channel, u16 code`.
	ChannelError = 0x0a,
	/// Inbound channel abort: `u16 channel`.
	ChannelAbort = 0x0b,
}
