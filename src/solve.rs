//! Meet-in-the-middle preimage search.
//!
//! Each hash step is invertible, so a target can be unwound byte by byte from
//! the end. Short prefixes are hashed forward into a table; suffixes are
//! unwound backward from the target until the two meet.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Context, Result, ensure};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cli::SolveArgs;
use crate::hash::{format_hash, hash_password, step, unwind};

pub const MAX_PREFIX_LEN: usize = 4;
pub const MAX_SUFFIX_LEN: usize = 6;

/// Upper bound on forward-table entries (every prefix of length `0..=prefix_len`).
pub const MAX_TABLE_ENTRIES: u64 = 1 << 24;

/// Upper bound on suffixes unwound across all rounds.
pub const MAX_SUFFIX_PROBES: u64 = 1 << 30;

/// Execute a preimage search described by CLI arguments.
pub async fn execute(args: SolveArgs) -> Result<SolveSummary> {
    let config = SolveConfig::try_from_args(args)?;
    Solver::new(config).run().await
}

/// Validated search parameters.
#[derive(Debug, Clone)]
pub struct SolveConfig {
    pub target: u32,
    pub alphabet: Vec<u8>,
    pub prefix_len: usize,
    pub suffix_len: usize,
    pub limit: usize,
    pub concurrency: usize,
}

impl SolveConfig {
    pub fn try_from_args(args: SolveArgs) -> Result<Self> {
        ensure!(args.alphabet.is_ascii(), "alphabet must be ASCII");
        let alphabet: Vec<u8> = args
            .alphabet
            .bytes()
            .collect::<BTreeSet<u8>>()
            .into_iter()
            .collect();
        ensure!(!alphabet.is_empty(), "alphabet must not be empty");
        ensure!(args.limit > 0, "--limit must be at least 1");
        ensure!(args.concurrency > 0, "--concurrency must be at least 1");
        ensure!(
            args.prefix_len <= MAX_PREFIX_LEN,
            "--prefix-len may not exceed {MAX_PREFIX_LEN}"
        );
        ensure!(
            args.suffix_len <= MAX_SUFFIX_LEN,
            "--suffix-len may not exceed {MAX_SUFFIX_LEN}"
        );

        let radix = alphabet.len() as u64;
        let table_entries = search_space(radix, 0, args.prefix_len);
        ensure!(
            table_entries.is_some_and(|n| n <= MAX_TABLE_ENTRIES),
            "forward table for {radix} symbols and --prefix-len {} exceeds {MAX_TABLE_ENTRIES} entries",
            args.prefix_len
        );
        let suffix_probes = search_space(radix, 1, args.suffix_len);
        ensure!(
            suffix_probes.is_some_and(|n| n <= MAX_SUFFIX_PROBES),
            "suffix search for {radix} symbols and --suffix-len {} exceeds {MAX_SUFFIX_PROBES} probes",
            args.suffix_len
        );

        Ok(Self {
            target: args.target,
            alphabet,
            prefix_len: args.prefix_len,
            suffix_len: args.suffix_len,
            limit: args.limit,
            concurrency: args.concurrency,
        })
    }
}

/// Number of strings over `radix` symbols with length in `min_len..=max_len`,
/// or `None` on overflow.
fn search_space(radix: u64, min_len: usize, max_len: usize) -> Option<u64> {
    (min_len..=max_len).try_fold(0u64, |total, len| {
        let count = radix.checked_pow(u32::try_from(len).ok()?)?;
        total.checked_add(count)
    })
}

/// JSON result of a search.
#[derive(Debug, Clone, Serialize)]
pub struct SolveSummary {
    pub target: String,
    pub alphabet: String,
    pub prefix_len: usize,
    pub suffix_len: usize,
    pub preimages: Vec<String>,
    pub suffixes_examined: u64,
    pub elapsed_ms: u64,
}

/// Digest of every prefix up to a given length, mapped back to the prefix.
#[derive(Debug, Default)]
pub struct ForwardTable {
    entries: HashMap<u32, Vec<u8>>,
}

impl ForwardTable {
    /// Shorter prefixes are inserted first and win on collision.
    pub fn build(alphabet: &[u8], max_len: usize) -> Self {
        let mut entries = HashMap::new();
        let mut frontier: Vec<(u32, Vec<u8>)> = vec![(0, Vec::new())];

        for len in 0..=max_len {
            for (acc, prefix) in &frontier {
                entries.entry(*acc).or_insert_with(|| prefix.clone());
            }
            if len == max_len {
                break;
            }
            frontier = frontier
                .iter()
                .flat_map(|(acc, prefix)| {
                    alphabet.iter().map(move |&byte| {
                        let mut next = prefix.clone();
                        next.push(byte);
                        (step(*acc, byte), next)
                    })
                })
                .collect();
        }

        Self { entries }
    }

    pub fn get(&self, acc: u32) -> Option<&[u8]> {
        self.entries.get(&acc).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct ScanShared {
    table: ForwardTable,
    alphabet: Vec<u8>,
    prefix_len: usize,
    target: u32,
    limit: usize,
    found: AtomicUsize,
    cancel: AtomicBool,
}

#[derive(Default)]
struct ScanResult {
    preimages: Vec<Vec<u8>>,
    examined: u64,
}

pub struct Solver {
    config: SolveConfig,
}

impl Solver {
    pub fn new(config: SolveConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<SolveSummary> {
        let started = Instant::now();
        let table = ForwardTable::build(&self.config.alphabet, self.config.prefix_len);
        debug!(entries = table.len(), "forward table built");

        let shared = Arc::new(ScanShared {
            table,
            alphabet: self.config.alphabet.clone(),
            prefix_len: self.config.prefix_len,
            target: self.config.target,
            limit: self.config.limit,
            found: AtomicUsize::new(0),
            cancel: AtomicBool::new(false),
        });

        let mut preimages: BTreeSet<(usize, Vec<u8>)> = BTreeSet::new();
        let mut examined = 0u64;

        for suffix_len in 0..=self.config.suffix_len {
            let round = if suffix_len == 0 {
                let mut result = ScanResult {
                    examined: 1,
                    ..ScanResult::default()
                };
                if let Some(prefix) = shared.table.get(shared.target) {
                    result.preimages.push(prefix.to_vec());
                    shared.found.fetch_add(1, Ordering::Relaxed);
                }
                result
            } else {
                self.scan_round(&shared, suffix_len).await
            };

            examined += round.examined;
            for preimage in round.preimages {
                debug_assert_eq!(hash_password(&preimage), shared.target);
                preimages.insert((preimage.len(), preimage));
            }
            debug!(suffix_len, found = preimages.len(), "suffix round finished");

            if preimages.len() >= self.config.limit {
                break;
            }
        }

        let preimages: Vec<String> = preimages
            .into_iter()
            .take(self.config.limit)
            .map(|(_, bytes)| String::from_utf8_lossy(&bytes).into_owned())
            .collect();

        info!(
            digest = %format_hash(self.config.target),
            found = preimages.len(),
            examined,
            "preimage search finished"
        );

        Ok(SolveSummary {
            target: format_hash(self.config.target),
            alphabet: String::from_utf8_lossy(&self.config.alphabet).into_owned(),
            prefix_len: self.config.prefix_len,
            suffix_len: self.config.suffix_len,
            preimages,
            suffixes_examined: examined,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Scan every suffix of exactly `suffix_len` bytes, one worker per final byte.
    async fn scan_round(&self, shared: &Arc<ScanShared>, suffix_len: usize) -> ScanResult {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut workers = JoinSet::new();

        for &last in &self.config.alphabet {
            workers.spawn(run_worker(
                shared.clone(),
                semaphore.clone(),
                last,
                suffix_len,
            ));
        }

        let mut round = ScanResult::default();
        while let Some(res) = workers.join_next().await {
            match res {
                Ok(Ok(result)) => {
                    round.examined += result.examined;
                    round.preimages.extend(result.preimages);
                }
                Ok(Err(err)) => warn!(error = %err, "suffix worker failed"),
                Err(join_err) => warn!(error = %join_err, "suffix worker task failed"),
            }
        }
        round
    }
}

async fn run_worker(
    shared: Arc<ScanShared>,
    semaphore: Arc<Semaphore>,
    last: u8,
    suffix_len: usize,
) -> Result<ScanResult> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .context("solver semaphore closed")?;
    if shared.cancel.load(Ordering::Relaxed) {
        return Ok(ScanResult::default());
    }
    tokio::task::spawn_blocking(move || scan_suffixes(&shared, last, suffix_len))
        .await
        .context("suffix scan panicked")
}

/// Enumerate suffixes ending in `last`, unwinding each from the target and
/// probing the forward table with what remains.
///
/// Only full-length prefixes are accepted, so each preimage comes from exactly
/// one (prefix, suffix) split and later rounds never repeat earlier ones.
fn scan_suffixes(shared: &ScanShared, last: u8, suffix_len: usize) -> ScanResult {
    let alphabet = &shared.alphabet;
    let head = unwind(shared.target, last);
    let middle_len = suffix_len - 1;
    let mut indices = vec![0usize; middle_len];
    let mut result = ScanResult::default();

    loop {
        if shared.cancel.load(Ordering::Relaxed) {
            break;
        }

        let acc = indices
            .iter()
            .rev()
            .fold(head, |acc, &idx| unwind(acc, alphabet[idx]));
        result.examined += 1;

        if let Some(prefix) = shared
            .table
            .get(acc)
            .filter(|prefix| prefix.len() == shared.prefix_len)
        {
            let mut preimage = prefix.to_vec();
            preimage.extend(indices.iter().map(|&idx| alphabet[idx]));
            preimage.push(last);
            result.preimages.push(preimage);

            if shared.found.fetch_add(1, Ordering::Relaxed) + 1 >= shared.limit {
                shared.cancel.store(true, Ordering::Relaxed);
                break;
            }
        }

        if !advance(&mut indices, alphabet.len()) {
            break;
        }
    }

    result
}

/// Odometer increment; returns false once every combination has been visited.
fn advance(indices: &mut [usize], radix: usize) -> bool {
    for idx in indices.iter_mut().rev() {
        *idx += 1;
        if *idx < radix {
            return true;
        }
        *idx = 0;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::TARGET_HASH;

    fn args(target: u32, alphabet: &str, prefix_len: usize, suffix_len: usize) -> SolveArgs {
        SolveArgs {
            target,
            alphabet: alphabet.to_string(),
            prefix_len,
            suffix_len,
            limit: 1,
            concurrency: 4,
        }
    }

    #[test]
    fn forward_table_maps_digest_to_prefix() {
        let table = ForwardTable::build(b"ab", 2);
        assert_eq!(table.get(0), Some(&b""[..]));
        assert_eq!(table.get(hash_password(b"ab")), Some(&b"ab"[..]));
        assert_eq!(table.get(hash_password(b"b")), Some(&b"b"[..]));
        assert!(table.get(TARGET_HASH).is_none());
    }

    #[test]
    fn odometer_visits_every_combination() {
        let mut indices = vec![0usize; 2];
        let mut visited = 1;
        while advance(&mut indices, 3) {
            visited += 1;
        }
        assert_eq!(visited, 9);
        assert_eq!(indices, vec![0, 0]);
    }

    #[test]
    fn empty_middle_scans_exactly_once() {
        let mut indices: Vec<usize> = Vec::new();
        assert!(!advance(&mut indices, 5));
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(SolveConfig::try_from_args(args(TARGET_HASH, "", 2, 2)).is_err());
        assert!(SolveConfig::try_from_args(args(TARGET_HASH, "ab", 9, 2)).is_err());
        assert!(SolveConfig::try_from_args(args(TARGET_HASH, "ab", 2, 9)).is_err());
        assert!(SolveConfig::try_from_args(args(TARGET_HASH, "héllo", 2, 2)).is_err());

        let mut zero_limit = args(TARGET_HASH, "ab", 2, 2);
        zero_limit.limit = 0;
        assert!(SolveConfig::try_from_args(zero_limit).is_err());
    }

    #[test]
    fn alphabet_is_deduplicated() {
        let config =
            SolveConfig::try_from_args(args(TARGET_HASH, "baab", 1, 1)).expect("config");
        assert_eq!(config.alphabet, b"ab");
    }

    #[tokio::test]
    async fn recovers_short_preimage() {
        let target = hash_password(b"hello");
        let mut request = args(target, "ehlo", 2, 3);
        request.limit = 3;
        let summary = execute(request).await.expect("solve should succeed");

        assert!(summary.preimages.iter().any(|p| p == "hello"));
        for preimage in &summary.preimages {
            assert_eq!(hash_password(preimage.as_bytes()), target);
        }
    }

    #[tokio::test]
    async fn recovers_gate_preimage() {
        let summary = execute(args(TARGET_HASH, "ab8YU", 3, 4))
            .await
            .expect("solve should succeed");

        assert_eq!(summary.target, "0xdeadbeef");
        assert_eq!(summary.preimages.len(), 1);
        assert_eq!(hash_password(summary.preimages[0].as_bytes()), TARGET_HASH);
    }

    #[test]
    fn rejects_search_spaces_over_budget() {
        let printable: String = (b' '..=b'~').map(char::from).collect();

        let err = SolveConfig::try_from_args(args(TARGET_HASH, &printable, 4, 1))
            .expect_err("95^4 prefixes exceed the table budget");
        assert!(err.to_string().contains("forward table"));

        let alnum = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        let err = SolveConfig::try_from_args(args(TARGET_HASH, alnum, 3, 6))
            .expect_err("62^6 suffixes exceed the probe budget");
        assert!(err.to_string().contains("suffix search"));

        assert!(SolveConfig::try_from_args(args(TARGET_HASH, alnum, 3, 5)).is_ok());
    }

    #[test]
    fn search_space_counts_every_length() {
        assert_eq!(search_space(2, 0, 3), Some(1 + 2 + 4 + 8));
        assert_eq!(search_space(62, 1, 1), Some(62));
        assert_eq!(search_space(u64::MAX, 0, 2), None);
    }

    #[tokio::test]
    async fn collects_preimages_across_suffix_rounds() {
        // One 7-byte preimage is reachable with a 4-byte suffix, the 8-byte one
        // only with a 5-byte suffix.
        let mut request = args(0xD899_5FF7, "!0Aaz~Mk", 3, 5);
        request.limit = 2;
        let summary = execute(request).await.expect("solve should succeed");

        assert_eq!(summary.preimages, vec!["aaA0~~M", "!!!0!AAa"]);
        for preimage in &summary.preimages {
            assert_eq!(hash_password(preimage.as_bytes()), 0xD899_5FF7);
        }
    }

    #[tokio::test]
    async fn later_rounds_do_not_repeat_earlier_preimages() {
        // "hello" splits as he|llo and h|ello; only the full-prefix split counts.
        let target = hash_password(b"hello");
        let mut request = args(target, "ehlo", 2, 4);
        request.limit = 2;
        let summary = execute(request).await.expect("solve should succeed");
        assert_eq!(summary.preimages, vec!["hello"]);
    }

    #[tokio::test]
    async fn unreachable_target_yields_no_preimages() {
        let summary = execute(args(TARGET_HASH, "a", 2, 2))
            .await
            .expect("solve should succeed");
        assert!(summary.preimages.is_empty());
        assert_eq!(summary.suffixes_examined, 3);
    }
}
