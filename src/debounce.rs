//! Quiescence-based write coalescing.
//!
//! Interactive editing submits a value per keystroke or input line; a
//! worker thread holds only the latest value and hands it to the sink
//! once no new submission has arrived for the configured window. A new
//! submission restarts the window instead of queueing a second write, so
//! at most one persist is ever in flight for the stream.

use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

pub const DEFAULT_WINDOW: Duration = Duration::from_millis(1000);

enum Msg<T> {
    Value(T),
    Flush,
    Shutdown,
}

pub struct Debouncer<T: Send + 'static> {
    tx: Sender<Msg<T>>,
    handle: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F>(window: Duration, mut sink: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, rx) = channel::<Msg<T>>();
        let handle = std::thread::spawn(move || run(rx, window, &mut sink));
        Debouncer {
            tx,
            handle: Some(handle),
        }
    }

    /// Replaces the pending value and restarts the quiet window.
    pub fn submit(&self, value: T) {
        let _ = self.tx.send(Msg::Value(value));
    }

    /// Asks the worker to write the pending value now. Fire-and-forget;
    /// dropping the debouncer is the synchronous way to drain.
    pub fn flush(&self) {
        let _ = self.tx.send(Msg::Flush);
    }
}

fn run<T, F: FnMut(T)>(rx: Receiver<Msg<T>>, window: Duration, sink: &mut F) {
    let mut pending: Option<T> = None;

    loop {
        let msg = if pending.is_some() {
            match rx.recv_timeout(window) {
                Ok(msg) => Some(msg),
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(value) = pending.take() {
                        sink(value);
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => None,
            }
        } else {
            // nothing pending, park until something arrives
            rx.recv().ok()
        };

        match msg {
            Some(Msg::Value(value)) => pending = Some(value),
            Some(Msg::Flush) => {
                if let Some(value) = pending.take() {
                    sink(value);
                }
            }
            Some(Msg::Shutdown) | None => {
                if let Some(value) = pending.take() {
                    sink(value);
                }
                return;
            }
        }
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        let _ = self.tx.send(Msg::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn collector() -> (Arc<Mutex<Vec<u32>>>, impl FnMut(u32) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        (seen, move |v| sink_seen.lock().unwrap().push(v))
    }

    #[test]
    fn rapid_submits_collapse_to_latest() {
        let (seen, sink) = collector();
        let debouncer = Debouncer::new(Duration::from_millis(40), sink);

        debouncer.submit(1);
        debouncer.submit(2);
        debouncer.submit(3);
        std::thread::sleep(Duration::from_millis(250));

        assert_eq!(*seen.lock().unwrap(), vec![3]);
    }

    #[test]
    fn drop_flushes_pending_value() {
        let (seen, sink) = collector();
        let debouncer = Debouncer::new(Duration::from_secs(60), sink);

        debouncer.submit(42);
        drop(debouncer);

        assert_eq!(*seen.lock().unwrap(), vec![42]);
    }

    #[test]
    fn submissions_restart_the_window() {
        let (seen, sink) = collector();
        let debouncer = Debouncer::new(Duration::from_millis(200), sink);

        debouncer.submit(1);
        std::thread::sleep(Duration::from_millis(50));
        debouncer.submit(2);
        std::thread::sleep(Duration::from_millis(50));
        debouncer.submit(3);
        std::thread::sleep(Duration::from_millis(500));

        assert_eq!(*seen.lock().unwrap(), vec![3]);
    }

    #[test]
    fn flush_writes_pending_without_waiting_out_the_window() {
        let (seen, sink) = collector();
        let debouncer = Debouncer::new(Duration::from_secs(60), sink);

        debouncer.submit(7);
        debouncer.flush();
        std::thread::sleep(Duration::from_millis(100));

        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn drop_without_pending_writes_nothing() {
        let (seen, sink) = collector();
        let debouncer = Debouncer::new(Duration::from_millis(10), sink);
        drop(debouncer);

        assert!(seen.lock().unwrap().is_empty());
    }
}
