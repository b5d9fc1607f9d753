//! Delivery of controller events to observers on one dedicated thread.

use crate::wallet::WalletSyncError;
use crate::wallet::sync::events::{SharedDataControllerEvent, SharedDataControllerObserver};

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::debug;

/// Name of the thread every observer callback runs on.
pub const DELIVERY_THREAD_NAME: &str = "shared-data-delivery";

type ObserverList = Arc<Mutex<Vec<Weak<dyn SharedDataControllerObserver>>>>;

enum Delivery {
	Broadcast(SharedDataControllerEvent),
	Direct(Weak<dyn SharedDataControllerObserver>, SharedDataControllerEvent),
}

/// Weakly held observer list plus the thread that notifies it.
///
/// Observers are notified in the order events were published. The thread exits once the
/// publisher is dropped and the remaining deliveries are drained.
pub struct EventPublisher {
	observers: ObserverList,
	sender: Sender<Delivery>,
}

impl EventPublisher {
	pub fn new() -> Result<Self, WalletSyncError> {
		let observers: ObserverList = Arc::new(Mutex::new(Vec::new()));
		let (sender, receiver) = mpsc::channel();

		let thread_observers = observers.clone();
		std::thread::Builder::new()
			.name(DELIVERY_THREAD_NAME.to_string())
			.spawn(move || deliver(receiver, thread_observers))
			.map_err(|e| {
				WalletSyncError::RuntimeError(format!("Failed to spawn delivery thread: {}", e))
			})?;

		Ok(Self { observers, sender })
	}

	/// Register an observer. Only a weak reference is kept, so dropping the last strong
	/// reference unregisters it.
	pub fn add(&self, observer: Weak<dyn SharedDataControllerObserver>) {
		let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
		observers.retain(|o| o.strong_count() > 0 && !std::ptr::addr_eq(o.as_ptr(), observer.as_ptr()));
		observers.push(observer);
	}

	pub fn remove(&self, observer: &Weak<dyn SharedDataControllerObserver>) {
		self.observers
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.retain(|o| o.strong_count() > 0 && !std::ptr::addr_eq(o.as_ptr(), observer.as_ptr()));
	}

	pub fn observer_count(&self) -> usize {
		self.observers
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.iter()
			.filter(|o| o.strong_count() > 0)
			.count()
	}

	/// Queue an event for every registered observer.
	pub fn publish(&self, event: SharedDataControllerEvent) {
		if self.sender.send(Delivery::Broadcast(event)).is_err() {
			debug!("Delivery thread is gone, dropping event");
		}
	}

	/// Queue an event for a single observer.
	pub fn publish_to(
		&self,
		observer: Weak<dyn SharedDataControllerObserver>,
		event: SharedDataControllerEvent,
	) {
		if self.sender.send(Delivery::Direct(observer, event)).is_err() {
			debug!("Delivery thread is gone, dropping event");
		}
	}
}

fn deliver(receiver: Receiver<Delivery>, observers: ObserverList) {
	while let Ok(delivery) = receiver.recv() {
		match delivery {
			Delivery::Broadcast(event) => {
				// Snapshot so observers may add or remove observers from their callback.
				let targets: Vec<_> = {
					let mut observers = observers.lock().unwrap_or_else(PoisonError::into_inner);
					observers.retain(|o| o.strong_count() > 0);
					observers.iter().filter_map(Weak::upgrade).collect()
				};
				for observer in targets {
					observer.shared_data_controller_did_publish(&event);
				}
			}
			Delivery::Direct(observer, event) => {
				if let Some(observer) = observer.upgrade() {
					observer.shared_data_controller_did_publish(&event);
				}
			}
		}
	}
	debug!("Delivery thread exiting");
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::mpsc::RecvTimeoutError;
	use std::time::Duration;

	struct ThreadRecorder {
		sender: Mutex<Sender<(String, &'static str)>>,
	}

	impl SharedDataControllerObserver for ThreadRecorder {
		fn shared_data_controller_did_publish(&self, event: &SharedDataControllerEvent) {
			let thread = std::thread::current().name().unwrap_or_default().to_string();
			let _ = self.sender.lock().unwrap().send((thread, event.name()));
		}
	}

	fn recorder() -> (Arc<ThreadRecorder>, Receiver<(String, &'static str)>) {
		let (sender, receiver) = mpsc::channel();
		(
			Arc::new(ThreadRecorder {
				sender: Mutex::new(sender),
			}),
			receiver,
		)
	}

	#[test]
	fn delivers_on_the_delivery_thread_in_order() {
		let publisher = EventPublisher::new().unwrap();
		let (observer, received) = recorder();
		let strong: Arc<dyn SharedDataControllerObserver> = observer.clone();
		publisher.add(Arc::downgrade(&strong));

		publisher.publish(SharedDataControllerEvent::DidStartRunning { first: true });
		publisher.publish(SharedDataControllerEvent::DidFinishRunning);

		let timeout = Duration::from_secs(2);
		let first = received.recv_timeout(timeout).unwrap();
		let second = received.recv_timeout(timeout).unwrap();
		assert_eq!(first, (DELIVERY_THREAD_NAME.to_string(), "didStartRunning"));
		assert_eq!(second, (DELIVERY_THREAD_NAME.to_string(), "didFinishRunning"));
	}

	#[test]
	fn dropped_observer_is_not_notified() {
		let publisher = EventPublisher::new().unwrap();
		let (observer, received) = recorder();
		let strong: Arc<dyn SharedDataControllerObserver> = observer;
		publisher.add(Arc::downgrade(&strong));
		assert_eq!(publisher.observer_count(), 1);

		drop(strong);
		publisher.publish(SharedDataControllerEvent::DidBecomeIdle);

		assert_eq!(publisher.observer_count(), 0);
		assert!(matches!(
			received.recv_timeout(Duration::from_millis(100)),
			Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected)
		));
	}

	#[test]
	fn removed_observer_is_not_notified() {
		let publisher = EventPublisher::new().unwrap();
		let (observer, received) = recorder();
		let strong: Arc<dyn SharedDataControllerObserver> = observer.clone();
		let weak = Arc::downgrade(&strong);
		publisher.add(weak.clone());
		publisher.remove(&weak);

		publisher.publish(SharedDataControllerEvent::DidBecomeIdle);
		assert!(received.recv_timeout(Duration::from_millis(100)).is_err());
	}
}
