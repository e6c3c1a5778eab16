use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel as channel;
use tracing::debug;

enum Control {
    Interval(Duration),
    Start,
    Stop,
    Shutdown,
}

/// Calls a closure periodically from its own thread.
///
/// The interval survives stop/start, and changing it while running restarts
/// the period from the moment of the change.
pub struct Ticker {
    control: channel::Sender<Control>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn<F>(name: &str, interval: Duration, mut on_tick: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (control, control_rx) = channel::unbounded::<Control>();
        let thread_name = name.to_string();
        let handle = thread::Builder::new().name(thread_name.clone()).spawn(move || {
            let mut interval = interval.max(Duration::from_millis(1));
            let mut running = false;
            let mut ticks = channel::never::<std::time::Instant>();
            loop {
                let control = channel::select! {
                    recv(control_rx) -> msg => Some(msg),
                    recv(ticks) -> _ => None,
                };
                match control {
                    None => on_tick(),
                    Some(Ok(Control::Interval(d))) => {
                        interval = d;
                        if running {
                            ticks = channel::tick(interval);
                        }
                    }
                    Some(Ok(Control::Start)) => {
                        if !running {
                            running = true;
                            ticks = channel::tick(interval);
                        }
                    }
                    Some(Ok(Control::Stop)) => {
                        running = false;
                        ticks = channel::never();
                    }
                    Some(Ok(Control::Shutdown)) | Some(Err(_)) => break,
                }
            }
            debug!(ticker = %thread_name, "Ticker stopped");
        })?;
        Ok(Self { control, handle: Some(handle) })
    }

    pub fn set_interval(&self, interval: Duration) {
        let _ = self.control.send(Control::Interval(interval.max(Duration::from_millis(1))));
    }

    pub fn start(&self) {
        let _ = self.control.send(Control::Start);
    }

    pub fn stop(&self) {
        let _ = self.control.send(Control::Stop);
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
