//! Traffic generator for exercising a running collector.
//!
//! Plays the part of a machine controller: connects to the collector, sends a
//! file's contents or a synthetic cycle, lingers for `delay` and hangs up.

use std::io;
use std::path::Path;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use log::{debug, info};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error_handling::types::SimulatorError;

pub const DEFAULT_REVISION: &str = "A";
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Builds the text of one cycle as a Haas controller prints it through DPRNT.
pub fn build_test_cycle(part_number: &str, revision: &str, now: NaiveDateTime) -> String {
    format!(
        "%\n\
         O03020\n\
         G103 P1 (LIMIT LOOKAHEAD)\n\
         (DPRNTS ALL TEXT, A PART NUMBER)\n\
         DPRNT[ PART NUMBER: {part_number}, REV. {revision}]\n\
         (SIMPLE DATE AND TIME)\n\
         DPRNT[ DATE YYMMDD: {date}]\n\
         DPRNT[ TIME HHMMSS: {time}]\n\
         \n\
         (DPRNT BLANK LINE)\n\
         DPRNT[]\n\
         DPRNT[ End of Cycle]\n\
         G103 (RETURN TO NORMAL LOOKAHEAD)\n\
         M30\n\
         %\n",
        date = now.format("%y%m%d"),
        time = now.format("%H%M%S"),
    )
}

pub struct TrafficGenerator {
    host: String,
    port: u16,
    delay: Duration,
}

impl TrafficGenerator {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            delay: DEFAULT_DELAY,
        }
    }

    /// Time to keep the connection open after the last byte is written.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Sends `payload` over a fresh connection, then waits `delay` and closes it.
    pub async fn send_payload(&self, payload: &[u8]) -> Result<(), SimulatorError> {
        info!("Connecting to {}...", self.target());
        let mut stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::ConnectionRefused => SimulatorError::ConnectionRefused(self.target()),
                _ => SimulatorError::IoError(e),
            })?;
        info!("Connected!");

        stream.write_all(payload).await?;
        stream.flush().await?;
        debug!("sent {} byte(s)", payload.len());

        tokio::time::sleep(self.delay).await;
        stream.shutdown().await?;
        Ok(())
    }

    pub async fn send_file(&self, path: &Path) -> Result<(), SimulatorError> {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SimulatorError::FileNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(SimulatorError::IoError(e)),
        };
        info!("Sending data from {}...", path.display());
        self.send_payload(&data).await?;
        info!("Data sent successfully!");
        Ok(())
    }

    /// Sends one synthetic cycle stamped with the current local time; returns the text sent.
    pub async fn send_test_cycle(&self, part_number: &str, revision: &str) -> Result<String, SimulatorError> {
        let cycle = build_test_cycle(part_number, revision, Local::now().naive_local());
        info!("Sending test data for part {}...", part_number);
        debug!("\n--- Data being sent ---\n{}--- End of data ---", cycle);
        self.send_payload(cycle.as_bytes()).await?;
        info!("Test data sent successfully!");
        Ok(cycle)
    }
}
