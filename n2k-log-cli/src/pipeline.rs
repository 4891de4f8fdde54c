//! Capture pipeline
//!
//! Single-threaded loop: poll the shutdown flag, wait for a datagram, decode
//! it, write every complete message, and run housekeeping when it is due.
//! The loop also ends when the source runs dry (file replay).
//! The session file is closed on every way out of [`Pipeline::run`].

use crate::config::PipelineConfig;
use crate::listener::{DatagramSource, Incoming, ListenerError, UdpListener};
use crate::stats::{SessionSummary, Ticker};
use crate::writer::{DurableSink, RotatingLogWriter, WriterError};
use n2k_log_decoder::{Datagram, Decoder, Record};
use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Failures that end a session
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Listener failure: {0}")]
    Listener(#[from] ListenerError),

    #[error("Log write failure: {0}")]
    Writer(#[from] WriterError),
}

pub struct Pipeline<D: DatagramSource = UdpListener, S: DurableSink = File> {
    source: D,
    decoder: Decoder,
    writer: RotatingLogWriter<S>,
    config: PipelineConfig,
    started: Instant,
}

impl<D: DatagramSource, S: DurableSink> Pipeline<D, S> {
    pub fn new(
        source: D,
        decoder: Decoder,
        writer: RotatingLogWriter<S>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            decoder,
            writer,
            config,
            started: Instant::now(),
        }
    }

    /// Capture until `shutdown` is set, the source closes, or a fatal error occurs
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<SessionSummary, PipelineError> {
        let result = self.receive_loop(shutdown);
        let closed = self.close();

        match result {
            Err(e) => {
                if let Err(close_err) = closed {
                    log::error!("Failed to close session after error: {}", close_err);
                }
                Err(e)
            }
            Ok(()) => {
                closed?;
                let summary = self.summary();
                log::info!("Session finished: {}", summary);
                Ok(summary)
            }
        }
    }

    /// Close the session file; safe to call more than once
    pub fn close(&mut self) -> Result<(), PipelineError> {
        self.writer.close()?;
        Ok(())
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            path: self.writer.path().to_path_buf(),
            elapsed: self.started.elapsed(),
            decoder: self.decoder.stats(),
            records: self.writer.records_written(),
            transient_errors: self.source.transient_errors(),
        }
    }

    fn receive_loop(&mut self, shutdown: &AtomicBool) -> Result<(), PipelineError> {
        let start = Instant::now();
        let mut housekeeping = Ticker::new(Some(self.config.housekeeping_interval()), start);
        let mut status = Ticker::new(self.config.status_interval(), start);
        let idle_limit = self.config.idle_warning();

        let mut since_housekeeping = 0u64;
        let mut last_traffic = start;
        let mut idle_warned = false;

        loop {
            if shutdown.load(Ordering::SeqCst) {
                log::info!("Shutdown requested");
                break;
            }

            let (now, idle) = match self.source.poll()? {
                Incoming::Datagram(datagram) => {
                    let now = datagram.instant;
                    write_messages(&mut self.decoder, &mut self.writer, datagram)?;

                    since_housekeeping += 1;
                    last_traffic = now;
                    if idle_warned {
                        log::info!("Traffic resumed");
                        idle_warned = false;
                    }
                    (now, false)
                }
                Incoming::Idle => (Instant::now(), true),
                Incoming::Closed => {
                    log::info!("End of input");
                    break;
                }
            };

            if let Some(limit) = idle_limit {
                if !idle_warned && now.saturating_duration_since(last_traffic) >= limit {
                    log::warn!("No datagrams received for {}s", limit.as_secs());
                    idle_warned = true;
                }
            }

            if idle || since_housekeeping >= self.config.housekeeping_every || housekeeping.tick(now)
            {
                self.decoder.evict_stale(now);
                since_housekeeping = 0;
                housekeeping.reset(now);
            }

            if status.tick(now) {
                log::info!("Status: {}", self.summary());
            }
        }

        Ok(())
    }
}

/// Decode one datagram and append every complete message
fn write_messages<S: DurableSink>(
    decoder: &mut Decoder,
    writer: &mut RotatingLogWriter<S>,
    datagram: Datagram<'_>,
) -> Result<(), WriterError> {
    for result in decoder.decode_datagram(datagram) {
        match result {
            Ok(message) => writer.append(&Record::from(&message))?,
            Err(e) => log::warn!("Skipping input: {}", e),
        }
    }
    Ok(())
}
