use crate::cli::Command;
use crate::config::Config;
use crate::images::{ImageAllowlist, ImageConfig};
use crate::probe::{ScopedConnection, run_probe};
use crate::utils::fmt_duration;
use anyhow::Context;
use std::process::ExitCode;
use tracing::{debug, error, info};
use yansi::Paint;

/// Main application struct holding the loaded configuration.
pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run a single command to completion and map its result to an exit code.
    pub async fn run(self, command: Command) -> ExitCode {
        let result = match command {
            Command::Probe => Ok(self.probe().await),
            Command::Image { url } => self.check_image(&url),
            Command::Patterns => self.print_patterns(),
        };

        match result {
            Ok(code) => code,
            Err(e) => {
                error!(error = ?e, "command failed");
                ExitCode::FAILURE
            }
        }
    }

    /// Probe the database once.
    ///
    /// Every failure, including a missing or malformed `DATABASE_URL`, is
    /// logged by the probe itself and never changes the exit code.
    async fn probe(&self) -> ExitCode {
        let target = ScopedConnection::new(self.config.database_url.as_deref());
        let outcome = run_probe(target, self.config.probe_timeout).await;
        debug!(
            healthy = outcome.is_success(),
            elapsed = fmt_duration(outcome.elapsed()),
            "probe finished"
        );

        ExitCode::SUCCESS
    }

    fn load_allowlist(&self) -> Result<ImageAllowlist, anyhow::Error> {
        let path = &self.config.images_config;
        if !path.exists() {
            info!(path = %path.display(), "image config not found, using built-in allowlist");
        }

        let image_config = ImageConfig::load(path)
            .with_context(|| format!("Failed to load image config from {}", path.display()))?;
        ImageAllowlist::new(&image_config).context("Invalid image config")
    }

    fn check_image(&self, raw: &str) -> Result<ExitCode, anyhow::Error> {
        let allowlist = self.load_allowlist()?;

        match allowlist.admit(raw)? {
            Some(admission) => {
                info!(url = raw, via = %admission, "image allowed");
                println!("{} {raw} ({admission})", "allowed".green().bold());
                Ok(ExitCode::SUCCESS)
            }
            None => {
                info!(url = raw, "image rejected");
                println!("{} {raw}", "rejected".red().bold());
                Ok(ExitCode::FAILURE)
            }
        }
    }

    fn print_patterns(&self) -> Result<ExitCode, anyhow::Error> {
        let allowlist = self.load_allowlist()?;

        for pattern in allowlist.patterns() {
            println!("{} {pattern}", "pattern".cyan());
        }
        for domain in allowlist.domains() {
            println!("{} {domain}", "domain".cyan());
        }

        Ok(ExitCode::SUCCESS)
    }
}
