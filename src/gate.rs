use anyhow::{Context, Result, ensure};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::audit::{AuditLog, AuditRecord};
use crate::cli::CheckArgs;
use crate::hash::{TARGET_HASH, format_hash, hash_password};

/// Printed before the password is read, without a trailing newline.
pub const PROMPT: &str = "Password: ";

/// Usable bytes of the fixed input buffer in the original crackme.
pub const LEGACY_LINE_LIMIT: usize = 127;

/// Verdict for a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    Denied,
}

impl Access {
    pub fn message(self) -> &'static str {
        match self {
            Access::Granted => "Access granted",
            Access::Denied => "Access denied",
        }
    }
}

/// Terminal state of one gate run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Decided(Access),
    /// Input ended before a single byte arrived. Shares the exit code of
    /// [`Access::Denied`] but prints no verdict.
    NoInput,
}

impl Outcome {
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Decided(Access::Granted) => 0,
            Outcome::Decided(Access::Denied) | Outcome::NoInput => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Decided(Access::Granted) => "granted",
            Outcome::Decided(Access::Denied) => "denied",
            Outcome::NoInput => "no_input",
        }
    }
}

/// Exact comparison against [`TARGET_HASH`].
pub fn check_access(hash: u32) -> Access {
    if hash == TARGET_HASH {
        Access::Granted
    } else {
        Access::Denied
    }
}

/// Drop one trailing `\n`. A preceding `\r` is part of the password.
pub fn strip_line_terminator(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\n").unwrap_or(line)
}

/// Read one password line. `None` means the stream ended before any byte.
///
/// With `max_line_bytes`, at most that many bytes are consumed and anything
/// past them stays in `reader` for a later call.
pub async fn read_password_line<R>(
    reader: &mut R,
    max_line_bytes: Option<usize>,
) -> Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let read = match max_line_bytes {
        Some(limit) => {
            (&mut *reader)
                .take(limit as u64)
                .read_until(b'\n', &mut line)
                .await
        }
        None => reader.read_until(b'\n', &mut line).await,
    }
    .context("failed to read password from input")?;

    if read == 0 {
        return Ok(None);
    }
    Ok(Some(strip_line_terminator(&line).to_vec()))
}

/// Validated settings for the `check` subcommand.
#[derive(Debug, Clone, Default)]
pub struct GateConfig {
    pub max_line_bytes: Option<usize>,
    pub log_dir: Option<std::path::PathBuf>,
}

impl GateConfig {
    pub fn try_from_args(args: CheckArgs) -> Result<Self> {
        let max_line_bytes = if args.legacy_buffer {
            Some(LEGACY_LINE_LIMIT)
        } else {
            args.max_line_bytes
        };
        if let Some(limit) = max_line_bytes {
            ensure!(limit > 0, "--max-line-bytes must be at least 1");
        }
        Ok(Self {
            max_line_bytes,
            log_dir: args.log_dir,
        })
    }
}

/// The hash checker: prompt, read, hash, compare, report.
pub struct Gate {
    config: GateConfig,
    audit: Option<AuditLog>,
}

impl Gate {
    pub async fn new(config: GateConfig) -> Result<Self> {
        let audit = match &config.log_dir {
            Some(dir) => Some(AuditLog::open(dir).await?),
            None => None,
        };
        Ok(Self { config, audit })
    }

    pub async fn run<R, W>(&self, reader: &mut R, writer: &mut W) -> Result<Outcome>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        writer
            .write_all(PROMPT.as_bytes())
            .await
            .context("failed to write prompt")?;
        writer.flush().await.context("failed to flush prompt")?;

        let Some(line) = read_password_line(reader, self.config.max_line_bytes).await? else {
            warn!("input ended before a password was read");
            self.record(AuditRecord::new(Outcome::NoInput, None, None))
                .await?;
            return Ok(Outcome::NoInput);
        };

        let hash = hash_password(&line);
        debug!(hash = %format_hash(hash), input_len = line.len(), "computed password digest");

        let access = check_access(hash);
        let outcome = Outcome::Decided(access);
        info!(outcome = outcome.label(), "access decided");

        writer
            .write_all(format!("{}\n", access.message()).as_bytes())
            .await
            .context("failed to write verdict")?;
        writer.flush().await.context("failed to flush verdict")?;

        self.record(AuditRecord::new(outcome, Some(line.len()), Some(hash)))
            .await?;
        Ok(outcome)
    }

    async fn record(&self, record: AuditRecord) -> Result<()> {
        match &self.audit {
            Some(audit) => audit.append(&record).await,
            None => Ok(()),
        }
    }
}

/// Run the gate against the process stdin/stdout.
pub async fn execute(args: CheckArgs) -> Result<Outcome> {
    let config = GateConfig::try_from_args(args)?;
    let gate = Gate::new(config).await?;
    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    gate.run(&mut stdin, &mut stdout).await
}
