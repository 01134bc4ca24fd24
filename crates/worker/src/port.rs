use serde_json::Value;
use tokio::sync::mpsc;

/// The far end of a [`MessagePort`] has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("message port closed")]
pub struct PortClosed;

/// One end of a bidirectional structured-message channel.
///
/// Only serialized [`Value`]s cross the channel, mirroring the structured-clone
/// boundary between isolated realms: neither side can hand the other a live
/// object.
#[derive(Debug)]
pub struct MessagePort {
	sender: PortSender,
	receiver: PortReceiver,
}

/// Creates a connected pair of ports.
pub fn message_channel() -> (MessagePort, MessagePort) {
	let (a_tx, a_rx) = mpsc::unbounded_channel();
	let (b_tx, b_rx) = mpsc::unbounded_channel();
	(
		MessagePort {
			sender: PortSender { tx: a_tx },
			receiver: PortReceiver { rx: b_rx },
		},
		MessagePort {
			sender: PortSender { tx: b_tx },
			receiver: PortReceiver { rx: a_rx },
		},
	)
}

impl MessagePort {
	/// Posts a message to the far end.
	pub fn post(&self, message: Value) -> Result<(), PortClosed> {
		self.sender.post(message)
	}

	/// Receives the next message, or `None` once the far end is gone.
	pub async fn recv(&mut self) -> Option<Value> {
		self.receiver.recv().await
	}

	/// Splits the port so sending and receiving can live on different tasks.
	pub fn split(self) -> (PortSender, PortReceiver) {
		(self.sender, self.receiver)
	}
}

/// Cloneable sending half of a [`MessagePort`].
#[derive(Debug, Clone)]
pub struct PortSender {
	tx: mpsc::UnboundedSender<Value>,
}

impl PortSender {
	/// Posts a message to the far end.
	pub fn post(&self, message: Value) -> Result<(), PortClosed> {
		self.tx.send(message).map_err(|_| PortClosed)
	}

	/// Returns true once the far end has dropped its receiver.
	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}
}

/// Receiving half of a [`MessagePort`].
#[derive(Debug)]
pub struct PortReceiver {
	rx: mpsc::UnboundedReceiver<Value>,
}

impl PortReceiver {
	/// Receives the next message, or `None` once every far-end sender is gone.
	pub async fn recv(&mut self) -> Option<Value> {
		self.rx.recv().await
	}

	/// Stops accepting messages; later posts from the far end fail.
	pub fn close(&mut self) {
		self.rx.close();
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[tokio::test]
	async fn messages_cross_in_both_directions() {
		let (mut host, mut guest) = message_channel();
		host.post(json!({"type": "ping"})).unwrap();
		assert_eq!(guest.recv().await, Some(json!({"type": "ping"})));
		guest.post(json!({"type": "pong"})).unwrap();
		assert_eq!(host.recv().await, Some(json!({"type": "pong"})));
	}

	#[tokio::test]
	async fn dropping_one_end_closes_the_other() {
		let (host, mut guest) = message_channel();
		drop(host);
		assert_eq!(guest.recv().await, None);
		assert_eq!(guest.post(json!(1)), Err(PortClosed));
	}
}
