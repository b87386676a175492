//! Lock-free control path (control threads → audio thread)
//!
//! Control threads never touch the encoder. They hold an [`EncoderControl`]
//! and push [`ConfigDelta`] values; the encoder owns the consumer end and
//! drains it at the start of every checkpoint.

use rtrb::{Consumer, Producer, RingBuffer};

use crate::config::ConfigDelta;

/// Default queue depth
pub const DEFAULT_CONTROL_CAPACITY: usize = 256;

/// SPSC delta queue
pub(crate) struct ControlQueue {
    producer: Producer<ConfigDelta>,
    consumer: Consumer<ConfigDelta>,
}

impl ControlQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let (producer, consumer) = RingBuffer::new(capacity.max(1));
        Self { producer, consumer }
    }

    /// Split into producer and consumer
    pub(crate) fn split(self) -> (EncoderControl, ControlReceiver) {
        (
            EncoderControl {
                producer: self.producer,
            },
            ControlReceiver {
                consumer: self.consumer,
            },
        )
    }
}

/// Producer handle given to a control thread
pub struct EncoderControl {
    producer: Producer<ConfigDelta>,
}

impl EncoderControl {
    /// Queue a delta (non-blocking). Returns false when the queue is full.
    pub fn send(&mut self, delta: ConfigDelta) -> bool {
        self.producer.push(delta).is_ok()
    }

    /// Queue several deltas, stopping at the first one that does not fit
    pub fn send_batch(&mut self, deltas: &[ConfigDelta]) -> usize {
        let mut count = 0;
        for &delta in deltas {
            if self.producer.push(delta).is_ok() {
                count += 1;
            } else {
                break;
            }
        }
        count
    }

    /// Free slots left in the queue
    pub fn available(&self) -> usize {
        self.producer.slots()
    }

    /// The encoder has been dropped
    pub fn is_abandoned(&self) -> bool {
        self.producer.is_abandoned()
    }
}

/// Consumer end, owned by the encoder
pub(crate) struct ControlReceiver {
    consumer: Consumer<ConfigDelta>,
}

impl ControlReceiver {
    pub(crate) fn pop(&mut self) -> Option<ConfigDelta> {
        self.consumer.pop().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_queue() {
        let (mut control, mut receiver) = ControlQueue::new(4).split();

        assert!(control.send(ConfigDelta::Order(2)));
        assert!(control.send(ConfigDelta::PostGain(-6.0)));

        assert_eq!(receiver.pop(), Some(ConfigDelta::Order(2)));
        assert_eq!(receiver.pop(), Some(ConfigDelta::PostGain(-6.0)));
        assert_eq!(receiver.pop(), None);
    }

    #[test]
    fn test_full_queue_rejects() {
        let (mut control, _receiver) = ControlQueue::new(2).split();
        let sent = control.send_batch(&[
            ConfigDelta::Refresh,
            ConfigDelta::Refresh,
            ConfigDelta::Refresh,
        ]);
        assert_eq!(sent, 2);
        assert_eq!(control.available(), 0);
        assert!(!control.send(ConfigDelta::RequestEvaluation));
    }

    #[test]
    fn test_abandoned_after_receiver_drop() {
        let (control, receiver) = ControlQueue::new(2).split();
        drop(receiver);
        assert!(control.is_abandoned());
    }
}
