//! In-process topic publisher

use tokio::sync::broadcast;
use tracing::trace;

/// Fan-out publisher for one topic.
///
/// Publishing never fails: with no subscriber attached the message is dropped.
#[derive(Debug)]
pub struct Publisher<T: Clone> {
    topic: String,
    sender: broadcast::Sender<T>,
}

impl<T: Clone> Publisher<T> {
    pub fn new(topic: &str, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Publisher {
            topic: topic.to_string(),
            sender,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    pub fn publish(&self, msg: T) {
        if self.sender.send(msg).is_err() {
            trace!(topic = %self.topic, "No subscribers, message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_fine() {
        let publisher: Publisher<i32> = Publisher::new("/traffic_waypoint", 4);
        publisher.publish(3);
        assert_eq!(publisher.topic(), "/traffic_waypoint");
    }

    #[test]
    fn subscribers_receive_in_order() {
        let publisher = Publisher::new("/final_waypoints", 4);
        let mut rx = publisher.subscribe();
        publisher.publish(1);
        publisher.publish(2);
        assert_eq!(rx.try_recv().unwrap(), 1);
        assert_eq!(rx.try_recv().unwrap(), 2);
    }
}
