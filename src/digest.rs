use anyhow::Result;
use tokio::io::AsyncBufRead;

use crate::cli::HashArgs;
use crate::gate::read_password_line;
use crate::hash::DigestReport;

/// Hash each argument, or every stdin line when no arguments were given.
pub async fn execute(args: HashArgs) -> Result<Vec<DigestReport>> {
    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
    collect_reports(&args.values, &mut stdin).await
}

pub async fn collect_reports<R>(values: &[String], reader: &mut R) -> Result<Vec<DigestReport>>
where
    R: AsyncBufRead + Unpin,
{
    if !values.is_empty() {
        return Ok(values
            .iter()
            .map(|value| DigestReport::new(value.as_bytes()))
            .collect());
    }

    let mut reports = Vec::new();
    while let Some(line) = read_password_line(reader, None).await? {
        reports.push(DigestReport::new(&line));
    }
    Ok(reports)
}
