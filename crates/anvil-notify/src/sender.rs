//! Report sink senders.

use anvil_core::ports::ReportSink;
use anvil_core::report::RunReport;
use anvil_core::{Error, Result};
use anvil_config::ReportSinkConfig;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use tracing::{debug, info};

/// POSTs the JSON report to a webhook URL.
pub struct HttpSink {
    url: String,
    client: reqwest::Client,
}

impl HttpSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ReportSink for HttpSink {
    async fn deliver(&self, report: &RunReport) -> Result<()> {
        debug!(url = %self.url, run = %report.run_id, "posting report");
        let response = self
            .client
            .post(&self.url)
            .json(report)
            .send()
            .await
            .map_err(|e| Error::Report(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Report(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Sends a plain-text summary mail per completed run.
pub struct EmailSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailSink {
    pub fn new(smtp_host: &str, smtp_port: u16, from: &str, to: &[String]) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)
            .map_err(|e| Error::Report(format!("smtp relay {smtp_host}: {e}")))?
            .port(smtp_port)
            .build();
        let from = from
            .parse()
            .map_err(|e| Error::Report(format!("invalid from address {from:?}: {e}")))?;
        let to = to
            .iter()
            .map(|addr| {
                addr.parse()
                    .map_err(|e| Error::Report(format!("invalid recipient {addr:?}: {e}")))
            })
            .collect::<Result<Vec<Mailbox>>>()?;
        Ok(Self {
            transport,
            from,
            to,
        })
    }

    fn build_message(&self, report: &RunReport) -> Result<Vec<Message>> {
        let subject = format!("[{}] {} {}", report.project, report.target, report.state);
        let body = format!(
            "{}\n\nrun:    {}\nfiring: {}\nqueued: {}\ndone:   {}\n",
            report.summary(),
            report.run_id,
            report.firing,
            report.created_at,
            report
                .completed_at
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
        self.to
            .iter()
            .map(|recipient| {
                Message::builder()
                    .from(self.from.clone())
                    .to(recipient.clone())
                    .subject(subject.clone())
                    .header(ContentType::TEXT_PLAIN)
                    .body(body.clone())
                    .map_err(|e| Error::Report(format!("build mail: {e}")))
            })
            .collect()
    }
}

#[async_trait]
impl ReportSink for EmailSink {
    async fn deliver(&self, report: &RunReport) -> Result<()> {
        for message in self.build_message(report)? {
            self.transport
                .send(message)
                .await
                .map_err(|e| Error::Report(format!("smtp send: {e}")))?;
        }
        Ok(())
    }
}

/// Writes the report summary to the log. Default sink when none are
/// configured, so no completion goes unrecorded.
pub struct LogSink;

#[async_trait]
impl ReportSink for LogSink {
    async fn deliver(&self, report: &RunReport) -> Result<()> {
        info!(
            run = %report.run_id,
            target = %report.target,
            state = %report.state,
            worker = report.worker.as_deref().unwrap_or("-"),
            "{}",
            report.summary()
        );
        Ok(())
    }
}

/// Build sink instances from validated configuration.
pub fn build_sinks(configs: &[ReportSinkConfig]) -> Result<Vec<Arc<dyn ReportSink>>> {
    let mut sinks: Vec<Arc<dyn ReportSink>> = Vec::with_capacity(configs.len().max(1));
    for config in configs {
        match config {
            ReportSinkConfig::Http { url } => sinks.push(Arc::new(HttpSink::new(url))),
            ReportSinkConfig::Email {
                smtp_host,
                smtp_port,
                from,
                to,
            } => sinks.push(Arc::new(EmailSink::new(smtp_host, *smtp_port, from, to)?)),
            ReportSinkConfig::Log => sinks.push(Arc::new(LogSink)),
        }
    }
    if sinks.is_empty() {
        sinks.push(Arc::new(LogSink));
    }
    Ok(sinks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::ids::{FiringId, RunId};
    use anvil_core::run::RunState;

    fn report(state: RunState, failure: Option<&str>) -> RunReport {
        RunReport {
            run_id: RunId::new(),
            target: "riscv-gcc@gcc-rv64".to_string(),
            project: "riscv-gcc".to_string(),
            firing: FiringId::new(),
            state,
            failure: failure.map(str::to_string),
            worker: Some("a.example.com".to_string()),
            created_at: chrono::Utc::now(),
            completed_at: Some(chrono::Utc::now()),
        }
    }

    #[tokio::test]
    async fn email_message_carries_summary() {
        let sink = EmailSink::new(
            "mail.example.com",
            587,
            "anvil@example.com",
            &["ops@example.com".to_string(), "dev@example.com".to_string()],
        )
        .unwrap();
        let messages = sink
            .build_message(&report(RunState::Failed, Some("worker lost")))
            .unwrap();
        assert_eq!(messages.len(), 2);
        let raw = String::from_utf8(messages[0].formatted()).unwrap();
        assert!(raw.contains("[riscv-gcc] riscv-gcc@gcc-rv64 failed"));
        assert!(raw.contains("worker lost"));
    }

    #[tokio::test]
    async fn invalid_addresses_are_rejected() {
        assert!(EmailSink::new("mail.example.com", 587, "not an address", &[]).is_err());
        assert!(EmailSink::new(
            "mail.example.com",
            587,
            "anvil@example.com",
            &["also not an address".to_string()],
        )
        .is_err());
    }

    #[tokio::test]
    async fn build_sinks_defaults_to_log() {
        let sinks = build_sinks(&[]).unwrap();
        assert_eq!(sinks.len(), 1);
        sinks[0]
            .deliver(&report(RunState::Succeeded, None))
            .await
            .unwrap();
    }
}
