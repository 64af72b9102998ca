//! End-of-game diagnostic report

use super::engine::Engine;
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// How long the driver waits for a busy sink before giving up
pub const REPORT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerResult {
    pub name: String,
    pub sum: i32,
    pub is_human: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameReport {
    pub package: String,
    pub package_id: String,
    pub showman: String,
    pub results: Vec<PlayerResult>,
    pub winner: Option<String>,
    /// Transition log of the whole game
    pub log: Vec<String>,
}

impl GameReport {
    pub fn of(engine: &Engine) -> Self {
        let data = engine.data();
        Self {
            package: engine.package().name.clone(),
            package_id: engine.package().id.clone(),
            showman: data.showman.name.clone(),
            results: data
                .players
                .iter()
                .filter(|p| !p.is_free())
                .map(|p| PlayerResult {
                    name: p.name.clone(),
                    sum: p.sum,
                    is_human: p.is_human,
                })
                .collect(),
            winner: data.winner().map(|i| data.players[i].name.clone()),
            log: data.log.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report sink is busy")]
    Busy,
    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Destination of end-of-game reports
pub trait ReportSink: Send {
    fn send(&mut self, report: &GameReport) -> Result<(), ReportError>;
}

/// Writes the report to the log as JSON
#[derive(Debug, Default)]
pub struct LogReportSink;

impl ReportSink for LogReportSink {
    fn send(&mut self, report: &GameReport) -> Result<(), ReportError> {
        let json = serde_json::to_string(report)?;
        info!("Game report: {}", json);
        Ok(())
    }
}

/// Keeps reports in memory
#[derive(Debug, Default)]
pub struct MemoryReportSink {
    pub reports: Vec<GameReport>,
}

impl ReportSink for MemoryReportSink {
    fn send(&mut self, report: &GameReport) -> Result<(), ReportError> {
        self.reports.push(report.clone());
        Ok(())
    }
}

/// Sends a report without ever failing the game
pub async fn send_report(sink: &Arc<Mutex<dyn ReportSink>>, report: &GameReport, wait: Duration) {
    let result = match tokio::time::timeout(wait, sink.lock()).await {
        Ok(mut sink) => sink.send(report),
        Err(_) => Err(ReportError::Busy),
    };
    if let Err(e) = result {
        warn!("Game report for {:?} was not sent: {}", report.package, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> GameReport {
        GameReport {
            package: "Demo".into(),
            package_id: "demo".into(),
            showman: "host".into(),
            results: vec![PlayerResult {
                name: "alice".into(),
                sum: 300,
                is_human: true,
            }],
            winner: Some("alice".into()),
            log: vec!["StartGame".into()],
        }
    }

    #[tokio::test]
    async fn test_send_report_delivers() {
        let memory = Arc::new(Mutex::new(MemoryReportSink::default()));
        let sink: Arc<Mutex<dyn ReportSink>> = memory.clone();

        send_report(&sink, &report(), REPORT_TIMEOUT).await;
        assert_eq!(memory.lock().await.reports, vec![report()]);
    }

    #[tokio::test]
    async fn test_busy_sink_is_skipped() {
        let memory = Arc::new(Mutex::new(MemoryReportSink::default()));
        let sink: Arc<Mutex<dyn ReportSink>> = memory.clone();
        let held = memory.lock().await;

        send_report(&sink, &report(), Duration::from_millis(20)).await;
        assert!(held.reports.is_empty());
    }

    #[test]
    fn test_send_report_from_blocking_context() {
        let memory = Arc::new(Mutex::new(MemoryReportSink::default()));
        let sink: Arc<Mutex<dyn ReportSink>> = memory.clone();

        tokio_test::block_on(send_report(&sink, &report(), REPORT_TIMEOUT));
        assert_eq!(tokio_test::block_on(memory.lock()).reports.len(), 1);
    }

    #[test]
    fn test_log_sink_encodes() {
        tokio_test::assert_ok!(LogReportSink.send(&report()));
    }
}
