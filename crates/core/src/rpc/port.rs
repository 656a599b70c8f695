use async_channel::{Receiver, Sender};

use crate::cnf::PORT_CHANNEL_CAPACITY;
use crate::err::Error;

/// One end of a bidirectional message channel.
///
/// Messages are delivered whole and in order; a pair of ports is the
/// process-local rendition of a platform message channel, with channel
/// ends movable through other messages the way transferables are.
#[derive(Debug)]
pub struct Port<S, R> {
	tx: Sender<S>,
	rx: Receiver<R>,
}

impl<S, R> Clone for Port<S, R> {
	fn clone(&self) -> Self {
		Port {
			tx: self.tx.clone(),
			rx: self.rx.clone(),
		}
	}
}

impl<S, R> Port<S, R> {
	/// Post a message to the other end.
	pub async fn send(&self, msg: S) -> Result<(), Error> {
		self.tx.send(msg).await.map_err(|_| Error::ChannelClosed)
	}

	/// Receive the next message from the other end.
	pub async fn recv(&self) -> Result<R, Error> {
		self.rx.recv().await.map_err(|_| Error::ChannelClosed)
	}

	/// Close both directions of this end. Pending receivers on the other
	/// end observe the closure as a channel error.
	pub fn close(&self) {
		self.tx.close();
		self.rx.close();
	}

	pub fn is_closed(&self) -> bool {
		self.tx.is_closed() || self.rx.is_closed()
	}

	/// How many receivers are still attached to the outbound direction.
	pub fn listener_count(&self) -> usize {
		self.tx.receiver_count()
	}
}

/// Create a connected pair of ports. Messages sent on one end arrive on
/// the other.
pub fn pair<A, B>() -> (Port<A, B>, Port<B, A>) {
	let (a_tx, a_rx) = async_channel::bounded::<A>(*PORT_CHANNEL_CAPACITY);
	let (b_tx, b_rx) = async_channel::bounded::<B>(*PORT_CHANNEL_CAPACITY);
	(
		Port {
			tx: a_tx,
			rx: b_rx,
		},
		Port {
			tx: b_tx,
			rx: a_rx,
		},
	)
}
