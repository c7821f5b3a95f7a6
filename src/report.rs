// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use crate::config::Config;
use crate::currencies::{rebase, rebase_on, RebaseRequest, RebasedTable};
use crate::email::{Attachment, DeliveryReport, Email, MailTransport};
use crate::error::ReportError;
use crate::exchange_rates::RateTable;
use crate::line_chart::{chart_file_name, ChartRenderer};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::fs::File;
use std::path::PathBuf;

/// A rebased currency group and the chart drawn from it.
#[derive(Debug)]
pub struct ChartedGroup {
    pub table: RebasedTable,
    pub chart: PathBuf,
}

/// One request per configured group, all against the same base and window.
pub fn build_requests(config: &Config) -> Result<Vec<RebaseRequest>, ReportError> {
    config
        .groups
        .iter()
        .map(|group| {
            RebaseRequest::new(
                &config.base_currency,
                group,
                config.window.amount,
                &config.window.unit,
            )
        })
        .collect()
}

/// Rebase every group before drawing anything, so a bad group fails the run
/// without leaving half the charts behind. Windows end on `today`, or on the
/// local date when it is `None`.
pub fn rebase_groups(
    table: &RateTable,
    config: &Config,
    today: Option<NaiveDate>,
) -> Result<Vec<(RebaseRequest, RebasedTable)>> {
    build_requests(config)?
        .into_iter()
        .map(|request| {
            let rebased = match today {
                Some(today) => rebase_on(table, &request, today),
                None => rebase(table, &request),
            };
            let rebased = rebased.with_context(|| {
                format!(
                    "Failed to rebase {} against {}",
                    request.watched_currencies.join("/"),
                    request.base_currency
                )
            })?;
            Ok((request, rebased))
        })
        .collect()
}

pub fn build_charts(
    table: &RateTable,
    config: &Config,
    renderer: &dyn ChartRenderer,
    today: Option<NaiveDate>,
) -> Result<Vec<ChartedGroup>> {
    let groups = rebase_groups(table, config, today)?;

    let progress = ProgressBar::new(groups.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let mut charted = Vec::with_capacity(groups.len());
    for (request, rebased) in groups {
        progress.set_message(chart_file_name(rebased.currencies()));
        info!(
            "Rebased {} day(s) of {} against {}",
            rebased.rows().len(),
            rebased.currencies().join("/"),
            rebased.base_currency()
        );
        let chart = renderer.render(&rebased, &request.window, &config.output_dir)?;
        info!("✅ Chart generated: {}", chart.display());
        charted.push(ChartedGroup {
            table: rebased,
            chart,
        });
        progress.inc(1);
    }
    progress.finish_with_message("charts done");

    Ok(charted)
}

pub fn compose_email(config: &Config, groups: &[ChartedGroup]) -> Result<Email> {
    let mut email = Email::new(&config.sender, &config.recipients, &config.subject)?
        .with_cc(&config.cc)?;
    email.add_email_text(config.template.render(&config.signature));

    for group in groups {
        email.add_image_attachment(&group.chart)?;
        if config.attach_csv {
            let name = format!("{}.csv", group.table.currencies().join("_"));
            email.add_attachment(Attachment::tabular_text(name, group.table.to_csv_string()?));
        }
    }
    for path in &config.extra_attachments {
        email.add_attachment(Attachment::from_path(path)?);
    }

    Ok(email)
}

/// Charts every group and mails them in one message.
pub async fn run_report(
    table: &RateTable,
    config: &Config,
    renderer: &dyn ChartRenderer,
    transport: &dyn MailTransport,
    today: Option<NaiveDate>,
) -> Result<DeliveryReport> {
    config.validate()?;
    let groups = build_charts(table, config, renderer, today)?;
    let email = compose_email(config, &groups)?;

    info!(
        "Sending {} attachment(s) to {} recipient(s)",
        email.attachments().len(),
        email.recipient_count()
    );
    Ok(email.send(transport).await)
}

/// Write each group's rebased rates to a timestamped CSV in the output dir.
pub fn export_csvs(
    table: &RateTable,
    config: &Config,
    today: Option<NaiveDate>,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(&config.output_dir)?;
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");

    let mut paths = Vec::new();
    for (_, rebased) in rebase_groups(table, config, today)? {
        let csv_path = config.output_dir.join(format!(
            "rates_{}_{}.csv",
            rebased.currencies().join("_"),
            timestamp
        ));
        let file = File::create(&csv_path)
            .with_context(|| format!("Failed to create {}", csv_path.display()))?;
        rebased.write_csv(file)?;
        info!("✅ CSV file created at: {}", csv_path.display());
        paths.push(csv_path);
    }

    Ok(paths)
}

/// Every quoted currency with its most recent rate per 1 EUR.
pub fn latest_rates(table: &RateTable) -> Option<(NaiveDate, Vec<(String, Option<f64>)>)> {
    let latest = table.latest()?;
    let rates = table
        .currencies()
        .iter()
        .map(|code| (code.clone(), table.rate(latest, code)))
        .collect();
    Some((latest.date, rates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currencies::tests::{aud_table, today};
    use crate::currencies::Window;
    use crate::email::tests::RecordingTransport;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    /// Writes a placeholder PNG where the real renderer would.
    struct StubRenderer;

    impl ChartRenderer for StubRenderer {
        fn render(&self, table: &RebasedTable, _: &Window, output_dir: &Path) -> Result<PathBuf> {
            std::fs::create_dir_all(output_dir)?;
            let path = output_dir.join(chart_file_name(table.currencies()));
            std::fs::write(&path, b"\x89PNG stub")?;
            Ok(path)
        }
    }

    /// Claims success without writing anything.
    struct ForgetfulRenderer;

    impl ChartRenderer for ForgetfulRenderer {
        fn render(&self, table: &RebasedTable, _: &Window, output_dir: &Path) -> Result<PathBuf> {
            Ok(output_dir.join(chart_file_name(table.currencies())))
        }
    }

    fn config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.groups = vec![
            vec!["EUR".to_string(), "GBP".to_string()],
            vec!["BRL".to_string()],
        ];
        config.window.amount = 3;
        config.window.unit = "day".to_string();
        config.sender = "reports@example.com".to_string();
        config.recipients = vec!["ana@example.com".to_string(), "ben@example.com".to_string()];
        config.output_dir = dir.path().join("output");
        config
    }

    #[tokio::test]
    async fn test_run_report() -> Result<()> {
        let dir = tempdir()?;
        let mut config = config(&dir);
        config.attach_csv = true;
        let transport = RecordingTransport::default();

        let report = run_report(&aud_table(), &config, &StubRenderer, &transport, Some(today())).await?;
        assert_eq!(report.delivered, vec!["ana@example.com", "ben@example.com"]);

        let sent = transport.sent.lock().unwrap();
        let raw = String::from_utf8_lossy(&sent[0].formatted()).into_owned();
        for name in ["EUR_GBP.png", "BRL.png", "EUR_GBP.csv", "BRL.csv"] {
            assert!(raw.contains(name), "{} missing from message", name);
        }
        assert!(config.output_dir.join("EUR_GBP.png").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_report_template_and_extra_attachments() -> Result<()> {
        let dir = tempdir()?;
        let mut config = config(&dir);
        let jingle = dir.path().join("jingle.wav");
        std::fs::write(&jingle, b"RIFF")?;
        config.template = crate::messages::MessageTemplate::Report;
        config.extra_attachments = vec![jingle];
        config.cc = vec!["ana@example.com".to_string()];
        let transport = RecordingTransport::default();

        let report = run_report(&aud_table(), &config, &StubRenderer, &transport, Some(today())).await?;
        assert_eq!(report.delivered.len(), 2);

        let sent = transport.sent.lock().unwrap();
        let raw = String::from_utf8_lossy(&sent[0].formatted()).into_owned();
        assert!(raw.contains("attached report"));
        assert!(raw.contains("jingle.wav"));
        assert!(raw.contains("audio/wav"));
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_currency_sends_nothing() -> Result<()> {
        let dir = tempdir()?;
        let mut config = config(&dir);
        config.groups.push(vec!["ZZZ".to_string()]);
        let transport = RecordingTransport::default();

        let err = run_report(&aud_table(), &config, &StubRenderer, &transport, Some(today()))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReportError>(),
            Some(ReportError::UnknownCurrency(code)) if code == "ZZZ"
        ));
        assert!(transport.sent.lock().unwrap().is_empty());
        assert!(!config.output_dir.join("EUR_GBP.png").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_chart_is_attachment_missing() -> Result<()> {
        let dir = tempdir()?;
        let config = config(&dir);
        let transport = RecordingTransport::default();

        let err = run_report(&aud_table(), &config, &ForgetfulRenderer, &transport, Some(today()))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReportError>(),
            Some(ReportError::AttachmentMissing(_))
        ));
        assert!(transport.sent.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_recipients_fails_before_charting() -> Result<()> {
        let dir = tempdir()?;
        let mut config = config(&dir);
        config.recipients.clear();

        let err = run_report(
            &aud_table(),
            &config,
            &StubRenderer,
            &RecordingTransport::default(),
            Some(today()),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReportError>(),
            Some(ReportError::MissingConfig(_))
        ));
        assert!(!config.output_dir.exists());
        Ok(())
    }

    #[test]
    fn test_export_csvs() -> Result<()> {
        let dir = tempdir()?;
        let config = config(&dir);

        let paths = export_csvs(&aud_table(), &config, Some(today()))?;
        assert_eq!(paths.len(), 2);

        let brl = std::fs::read_to_string(&paths[1])?;
        assert!(brl.starts_with("Date,BRL\n"));
        assert!(brl.contains("2026-10-19,3.75"));
        Ok(())
    }

    #[test]
    fn test_latest_rates() {
        let (date, rates) = latest_rates(&aud_table()).unwrap();
        assert_eq!(date, today());
        assert_eq!(rates[0], ("AUD".to_string(), Some(1.6)));
        assert_eq!(rates.len(), 3);
    }
}
