//! Serialization and transmission of assembled usage reports.
#[cfg(test)]
use std::cell::RefCell;
#[cfg(test)]
use std::collections::VecDeque;
use std::collections::HashMap;
use std::io::Write;
use std::time::SystemTime;

use bytes::BytesMut;
use flate2::write::GzEncoder;
use flate2::Compression;
use prost::Message;
use thiserror::Error;
use url::Url;

use crate::config::Config;
use crate::proto::Report;
use crate::proto::ReportHeader;
use crate::proto::TracesAndStats;

/// Sent as both the User-Agent header and the header's agent version.
const AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "@", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("could not encode usage report: {0}")]
    Encode(#[from] prost::EncodeError),

    #[error("could not prepare usage report: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not determine host identity: {0}")]
    Host(#[from] sys_info::Error),

    #[error("usage report request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("usage report rejected with status {status}: {body}")]
    Status { status: u16, body: String },
}

impl SenderError {
    /// Whether the ingress rejected the report because its traces are too
    /// old to accept. Such a report can never succeed on a retry.
    pub fn is_stale_report(&self) -> bool {
        matches!(self, SenderError::Status { body, .. } if body.contains("skewed timestamp"))
    }
}

enum Transport {
    Http {
        client: reqwest::blocking::Client,
        endpoint: Url,
        api_key: String,
    },
    #[cfg(test)]
    Mock(RefCell<MockTransport>),
}

/// Serializes a batch into the report envelope, compresses it and
/// performs one blocking submission.
///
/// The sender never retries; whether a failed report is retried or
/// dropped is the caller's decision.
pub struct ReportSender {
    transport: Transport,
    header: ReportHeader,
}

impl ReportSender {
    pub fn new(config: &Config, api_key: String) -> Result<Self, SenderError> {
        Ok(Self {
            transport: Transport::Http {
                client: reqwest::blocking::Client::new(),
                endpoint: config.tracing_endpoint.clone(),
                api_key,
            },
            header: report_header(config)?,
        })
    }

    /// Submits one batch of traces, classified as either delivered or
    /// failed; a non-2xx response carries the status and body upward so
    /// the caller can tell permanent rejections from transient ones.
    pub fn send(&self, traces_per_query: HashMap<String, TracesAndStats>) -> Result<(), SenderError> {
        let report = Report {
            header: Some(self.header.clone()),
            operation_count: traces_per_query
                .values()
                .map(|group| group.trace.len() as u64)
                .sum(),
            traces_per_query,
            end_time: Some(SystemTime::now().into()),
        };
        self.transmit(report)
    }

    fn transmit(&self, report: Report) -> Result<(), SenderError> {
        match &self.transport {
            Transport::Http {
                client,
                endpoint,
                api_key,
            } => {
                let mut content = BytesMut::new();
                report.encode(&mut content)?;
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&content)?;
                let compressed = encoder.finish()?;
                tracing::debug!(bytes = compressed.len(), "submitting usage report");

                let response = client
                    .post(endpoint.clone())
                    .body(compressed)
                    .header("X-Api-Key", api_key.as_str())
                    .header("Content-Encoding", "gzip")
                    .header("Content-Type", "application/protobuf")
                    .header("Accept", "application/json")
                    .header("User-Agent", AGENT)
                    .send()?;

                let status = response.status();
                if !status.is_success() {
                    return Err(SenderError::Status {
                        status: status.as_u16(),
                        body: response.text().unwrap_or_default(),
                    });
                }
                Ok(())
            }
            #[cfg(test)]
            Transport::Mock(mock) => mock.borrow_mut().submit(report),
        }
    }
}

fn report_header(config: &Config) -> Result<ReportHeader, SenderError> {
    let hostname = match &config.hostname {
        Some(hostname) => hostname.clone(),
        None => sys_info::hostname()?,
    };
    Ok(ReportHeader {
        graph_ref: config.graph_ref(),
        hostname,
        agent_version: AGENT.to_string(),
        runtime_version: "rust".to_string(),
        uname: get_uname()?,
        ..Default::default()
    })
}

#[cfg(not(target_os = "windows"))]
fn get_uname() -> Result<String, std::io::Error> {
    let u = uname::uname()?;
    Ok(format!(
        "{}, {}, {}, {}, {}",
        u.sysname, u.nodename, u.release, u.version, u.machine
    ))
}

#[cfg(target_os = "windows")]
fn get_uname() -> Result<String, std::io::Error> {
    // Best we can do on windows right now
    let sysname = sys_info::os_type().unwrap_or_else(|_| "Windows".to_owned());
    let nodename = sys_info::hostname().unwrap_or_else(|_| "unknown".to_owned());
    let release = sys_info::os_release().unwrap_or_else(|_| "unknown".to_owned());
    let version = "unknown";
    let machine = "unknown";
    Ok(format!(
        "{}, {}, {}, {}, {}",
        sysname, nodename, release, version, machine
    ))
}

#[cfg(test)]
pub(crate) struct MockTransport {
    outcomes: VecDeque<Result<(), SenderError>>,
    reports: Vec<Report>,
}

#[cfg(test)]
impl MockTransport {
    fn submit(&mut self, report: Report) -> Result<(), SenderError> {
        self.reports.push(report);
        self.outcomes.pop_front().unwrap_or(Ok(()))
    }
}

#[cfg(test)]
impl ReportSender {
    /// A sender that records reports instead of transmitting them and
    /// replays the scripted outcomes in order (then succeeds).
    pub(crate) fn with_mock(outcomes: Vec<Result<(), SenderError>>) -> Self {
        Self {
            transport: Transport::Mock(RefCell::new(MockTransport {
                outcomes: outcomes.into(),
                reports: Vec::new(),
            })),
            header: ReportHeader::default(),
        }
    }

    pub(crate) fn sent_reports(&self) -> Vec<Report> {
        match &self.transport {
            Transport::Mock(mock) => mock.borrow().reports.clone(),
            _ => Vec::new(),
        }
    }
}
