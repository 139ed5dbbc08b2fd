//! Fan-in set: receives from whichever endpoint has a value.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Select, Sender};

use crate::AddError;

struct Live<T> {
    endpoints: Vec<Receiver<T>>,
    exhausted: bool,
}

/// A dynamic set of input endpoints.
///
/// [`next`](Self::next) calls are serialized through one dispatch lock, so concurrent
/// callers never race on the same endpoint. An endpoint is dropped from the set only once
/// it is closed *and* drained. Once the set runs out of endpoints it is exhausted for good.
pub struct FanIn<T> {
    dispatch: Mutex<()>,
    live: Mutex<Live<T>>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl<T> FanIn<T> {
    #[must_use]
    pub fn new(endpoints: Vec<Receiver<T>>) -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);

        Self {
            dispatch: Mutex::new(()),
            live: Mutex::new(Live {
                endpoints,
                exhausted: false,
            }),
            wake_tx,
            wake_rx,
        }
    }

    fn live(&self) -> MutexGuard<'_, Live<T>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an endpoint to the live set.
    ///
    /// A [`next`](Self::next) call blocked on the existing endpoints rescans and may
    /// receive from the new one.
    ///
    /// # Errors
    ///
    /// * If the set is already exhausted. The endpoint is handed back.
    pub fn add(&self, endpoint: Receiver<T>) -> Result<(), AddError<Receiver<T>>> {
        let mut live = self.live();
        if live.exhausted {
            return Err(AddError::Exhausted(endpoint));
        }
        live.endpoints.push(endpoint);
        drop(live);

        let _ = self.wake_tx.try_send(());

        Ok(())
    }

    /// Blocks until one live endpoint yields a value, returning `None` once every endpoint
    /// has been closed and drained.
    ///
    /// After the first `None`, every later call returns `None` immediately.
    pub fn next(&self) -> Option<T> {
        let _dispatch = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            let snapshot = {
                let mut live = self.live();
                if live.endpoints.is_empty() {
                    if !live.exhausted {
                        live.exhausted = true;
                        log::debug!("next: all endpoints drained, set is exhausted");
                    }
                    return None;
                }
                live.endpoints.clone()
            };

            let mut select = Select::new();
            for endpoint in &snapshot {
                select.recv(endpoint);
            }
            let wake = select.recv(&self.wake_rx);

            let oper = select.select();
            let index = oper.index();

            if index == wake {
                let _ = oper.recv(&self.wake_rx);
                continue;
            }

            // Disconnection is only reported once the endpoint's buffer is empty.
            match oper.recv(&snapshot[index]) {
                Ok(value) => return Some(value),
                Err(crossbeam_channel::RecvError) => {
                    log::debug!("next: endpoint {index} closed and drained, removing it");
                    self.remove(&snapshot[index]);
                }
            }
        }
    }

    fn remove(&self, endpoint: &Receiver<T>) {
        let mut live = self.live();
        if let Some(position) = live
            .endpoints
            .iter()
            .position(|x| x.same_channel(endpoint))
        {
            live.endpoints.swap_remove(position);
        }
    }

    /// Iterates over received values until the set is exhausted.
    #[must_use]
    pub const fn iter(&self) -> Iter<'_, T> {
        Iter { set: self }
    }

    /// Number of endpoints not yet known to be closed and drained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live().endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.live().exhausted
    }

    /// Snapshot of the endpoints not yet known to be closed and drained.
    ///
    /// Values received through the returned clones bypass this set.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Receiver<T>> {
        self.live().endpoints.clone()
    }
}

impl<T> FromIterator<Receiver<T>> for FanIn<T> {
    fn from_iter<I: IntoIterator<Item = Receiver<T>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Blocking iterator returned by [`FanIn::iter`].
pub struct Iter<'a, T> {
    set: &'a FanIn<T>,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.set.next()
    }
}

impl<'a, T> IntoIterator for &'a FanIn<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{Capacity, channel, channels};

    #[test_log::test]
    fn empty_set_is_exhausted_immediately() {
        let fan_in = FanIn::<u8>::new(vec![]);

        assert_eq!(fan_in.next(), None);
        assert!(fan_in.is_exhausted());
    }

    #[test_log::test]
    fn exhaustion_is_terminal() {
        let (tx, rx) = channel(Capacity::Bounded(2));
        tx.send(1).unwrap();
        drop(tx);

        let fan_in = FanIn::new(vec![rx]);

        assert_eq!(fan_in.next(), Some(1));
        for _ in 0..5 {
            assert_eq!(fan_in.next(), None);
        }
    }

    #[test_log::test]
    fn add_after_exhaustion_is_rejected() {
        let fan_in = FanIn::new(vec![]);
        assert_eq!(fan_in.next(), None);

        let (tx, rx) = channel::<u8>(Capacity::Bounded(1));
        tx.send(3).unwrap();

        let rejected = fan_in.add(rx).unwrap_err().into_inner();
        assert_eq!(rejected.recv().ok(), Some(3));
        assert_eq!(fan_in.next(), None);
    }

    #[test_log::test]
    fn buffered_values_are_delivered_before_endpoint_is_dropped() {
        let (senders, receivers) = channels(3, Capacity::Bounded(10));
        for (i, tx) in senders.iter().enumerate() {
            for j in 0..10 {
                tx.send(i * 10 + j).unwrap();
            }
        }
        drop(senders);

        let fan_in = FanIn::new(receivers);
        let mut received: Vec<_> = fan_in.iter().collect();
        received.sort_unstable();

        assert_eq!(received, (0..30).collect::<Vec<_>>());
        assert!(fan_in.is_empty());
    }

    #[test_log::test]
    fn per_endpoint_order_is_preserved() {
        let (tx_a, rx_a) = channel(Capacity::Unbounded);
        let (tx_b, rx_b) = channel(Capacity::Unbounded);
        for i in 0..50 {
            tx_a.send(("a", i)).unwrap();
            tx_b.send(("b", i)).unwrap();
        }
        drop((tx_a, tx_b));

        let values: Vec<_> = FanIn::new(vec![rx_a, rx_b]).iter().collect();

        for name in ["a", "b"] {
            let sequence: Vec<_> = values
                .iter()
                .filter(|(n, _)| *n == name)
                .map(|(_, i)| *i)
                .collect();
            assert_eq!(sequence, (0..50).collect::<Vec<_>>());
        }
    }

    #[test_log::test]
    fn blocked_next_sees_endpoint_added_later() {
        let (idle_tx, idle_rx) = channel::<i32>(Capacity::Unbuffered);
        let fan_in = Arc::new(FanIn::new(vec![idle_rx]));

        let reader = thread::spawn({
            let fan_in = fan_in.clone();
            move || fan_in.next()
        });

        thread::sleep(Duration::from_millis(50));

        let (tx, rx) = channel(Capacity::Bounded(1));
        tx.send(42).unwrap();
        fan_in.add(rx).unwrap();

        assert_eq!(reader.join().unwrap(), Some(42));
        drop(idle_tx);
    }

    #[test_log::test]
    fn endpoints_snapshot_drops_drained_endpoints() {
        let (closed_tx, closed_rx) = channel(Capacity::Bounded(1));
        let (open_tx, open_rx) = channel(Capacity::Bounded(1));
        closed_tx.send(1).unwrap();
        drop(closed_tx);

        let fan_in = Arc::new(FanIn::new(vec![closed_rx, open_rx.clone()]));
        assert_eq!(fan_in.endpoints().len(), 2);
        assert_eq!(fan_in.next(), Some(1));

        let reader = thread::spawn({
            let fan_in = fan_in.clone();
            move || fan_in.next()
        });

        while fan_in.endpoints().len() > 1 {
            thread::sleep(Duration::from_millis(5));
        }
        let remaining = fan_in.endpoints();
        assert!(remaining[0].same_channel(&open_rx));

        open_tx.send(2).unwrap();
        assert_eq!(reader.join().unwrap(), Some(2));
    }

    #[test_log::test]
    fn concurrent_readers_split_values_without_duplicates() {
        let (senders, receivers) = channels(4, Capacity::Bounded(2));
        let fan_in = Arc::new(FanIn::new(receivers));

        let writers: Vec<_> = senders
            .into_iter()
            .enumerate()
            .map(|(i, tx)| {
                thread::spawn(move || {
                    for j in 0..250 {
                        tx.send(i * 250 + j).unwrap();
                    }
                })
            })
            .collect();

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let fan_in = fan_in.clone();
                thread::spawn(move || fan_in.iter().collect::<Vec<_>>())
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }

        let mut received: Vec<_> = readers
            .into_iter()
            .flat_map(|reader| reader.join().unwrap())
            .collect();
        received.sort_unstable();

        assert_eq!(received, (0..1_000).collect::<Vec<_>>());
        assert!(fan_in.is_exhausted());
    }
}
