//----------------------------------------------------------------------------------------------------
// Global macros for internal tandem usage.

//---------------------------------------------------------------------------------------------------- Channels
// The receiving side of our internal channels may
// legitimately be gone (a closed entry, a dropped session),
// so a failed send is never an error, it is dropped.

// Send, a gone receiver is fine.
macro_rules! send {
	($channel:expr, $($msg:tt)+) => {
		drop($channel.send($($msg)+))
	}
}
pub(crate) use send;

// `try_send` a channel message, ignore full/disconnected.
macro_rules! try_send {
	($channel:expr, $($msg:tt)+) => {
		drop($channel.try_send($($msg)+))
	}
}
pub(crate) use try_send;

// Take the message a `Select` said is ready.
//
// Readiness can be spurious, an empty
// channel `continue`s the enclosing loop.
macro_rules! select_recv {
	($channel:expr) => {
		match $channel.try_recv() {
			Ok(msg) => msg,
			_ => continue,
		}
	}
}
pub(crate) use select_recv;

//---------------------------------------------------------------------------------------------------- Logging
// `log` at `$level`, compiled out without the `log` feature.
//
// Messages read "Component - what happened".
macro_rules! log2 {
	($level:ident, $($arg:tt)+) => {{
		#[cfg(feature = "log")]
		::log::$level!($($arg)+);
	}};
}
pub(crate) use log2;

macro_rules! error2 { ($($arg:tt)+) => { $crate::macros::log2!(error, $($arg)+) } }
macro_rules! warn2  { ($($arg:tt)+) => { $crate::macros::log2!(warn,  $($arg)+) } }
macro_rules! info2  { ($($arg:tt)+) => { $crate::macros::log2!(info,  $($arg)+) } }
macro_rules! debug2 { ($($arg:tt)+) => { $crate::macros::log2!(debug, $($arg)+) } }
macro_rules! trace2 { ($($arg:tt)+) => { $crate::macros::log2!(trace, $($arg)+) } }
pub(crate) use {error2,warn2,info2,debug2,trace2};
