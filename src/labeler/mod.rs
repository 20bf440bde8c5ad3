//! Address labeler: scrape an explorer page title per address and append a label row.

use crate::config::LabelerConfig;
use crate::error::LookupError;
use crate::labels::{LabelTable, LabelWriter};
use crate::model::{normalize_address, AddressLabel, UNKNOWN_LABEL};
use crate::util::RetryPolicy;
use anyhow::Context;
use rand::seq::SliceRandom;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Text served with HTTP 200 when the explorer throttles a client.
const RATE_LIMIT_MARKER: &str = "amounts of traffic coming from your network";

fn title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"))
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(contract\s+)?address\s*(0x[0-9a-f]*)?\s*(\||$)")
            .expect("valid placeholder regex")
    })
}

/// First `<title>` of a page, entities decoded and whitespace collapsed.
pub fn extract_title(html: &str) -> Option<String> {
    let raw = title_regex().captures(html)?.get(1)?.as_str();
    let decoded = decode_entities(raw);
    let title = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Split a page title into `(dapp, contract)`.
///
/// `"Uniswap V3: Router 2 | Address 0x.. | Etherscan"` gives `("Uniswap V3", "Uniswap V3: Router 2")`;
/// generic `"Address 0x.. | Etherscan"` titles and missing titles give `Unknown`.
pub fn classify_title(title: Option<&str>) -> (String, String) {
    let unknown = || (UNKNOWN_LABEL.to_string(), UNKNOWN_LABEL.to_string());
    let title = match title {
        Some(t) if !t.trim().is_empty() => t,
        _ => return unknown(),
    };
    let before_pipe = title.split('|').next().unwrap_or_default().trim();
    if let Some((dapp, _)) = title.split_once(':') {
        return (dapp.to_string(), before_pipe.to_string());
    }
    if placeholder_regex().is_match(title) || before_pipe.is_empty() {
        return unknown();
    }
    (before_pipe.to_string(), before_pipe.to_string())
}

/// Result of labeling one address.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelOutcome {
    Labeled(AddressLabel),
    /// Already present in the label table or earlier in the input.
    Skipped(String),
    LookupFailed { address: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSummary {
    pub labeled: u64,
    pub unknown: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl LabelSummary {
    fn record(&mut self, outcome: &LabelOutcome) {
        match outcome {
            LabelOutcome::Labeled(label) if label.is_known() => self.labeled += 1,
            LabelOutcome::Labeled(_) => self.unknown += 1,
            LabelOutcome::Skipped(_) => self.skipped += 1,
            LabelOutcome::LookupFailed { .. } => self.failed += 1,
        }
    }
}

/// Picks a User-Agent per request, avoiding an immediate repeat.
struct UserAgentRotation {
    agents: Vec<String>,
    last: Option<usize>,
}

impl UserAgentRotation {
    fn new(agents: &[String]) -> Self {
        UserAgentRotation {
            agents: agents
                .iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            last: None,
        }
    }

    fn pick(&mut self) -> Option<&str> {
        let candidates: Vec<usize> = (0..self.agents.len())
            .filter(|&i| self.agents.len() == 1 || Some(i) != self.last)
            .collect();
        let pick = *candidates.choose(&mut rand::thread_rng())?;
        self.last = Some(pick);
        Some(self.agents[pick].as_str())
    }
}

/// Labels addresses one at a time, appending each result to the label table file.
pub struct Labeler {
    client: reqwest::Client,
    base_url: String,
    delay: Duration,
    retry: RetryPolicy,
    agents: UserAgentRotation,
    known: LabelTable,
    writer: LabelWriter,
}

impl Labeler {
    pub fn new(config: &LabelerConfig, labels_path: &Path) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let known = LabelTable::load(labels_path)
            .with_context(|| format!("failed to load labels: {}", labels_path.display()))?;
        let writer = LabelWriter::open(labels_path)
            .with_context(|| format!("failed to open labels: {}", labels_path.display()))?;
        Ok(Labeler {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            delay: Duration::from_millis(config.delay_ms),
            retry: config.retry_policy(),
            agents: UserAgentRotation::new(&config.user_agents),
            known,
            writer,
        })
    }

    /// Label every address in order. Lookup failures are reported, not raised;
    /// only label table write errors abort the run.
    pub async fn run(&mut self, addresses: &[String]) -> anyhow::Result<(LabelSummary, Vec<LabelOutcome>)> {
        let mut summary = LabelSummary::default();
        let mut outcomes = Vec::with_capacity(addresses.len());
        let mut seen = HashSet::new();
        let mut fetched_any = false;

        for raw in addresses {
            let address = normalize_address(raw);
            if address.is_empty() {
                continue;
            }
            let outcome = if self.known.contains(&address) || !seen.insert(address.clone()) {
                LabelOutcome::Skipped(address)
            } else {
                if fetched_any {
                    tokio::time::sleep(self.delay).await;
                }
                fetched_any = true;
                self.label_one(&address).await?
            };
            summary.record(&outcome);
            outcomes.push(outcome);
        }

        info!(
            labeled = summary.labeled,
            unknown = summary.unknown,
            skipped = summary.skipped,
            failed = summary.failed,
            "label done"
        );
        Ok((summary, outcomes))
    }

    async fn label_one(&mut self, address: &str) -> anyhow::Result<LabelOutcome> {
        match self.lookup_title(address).await {
            Ok(title) => {
                let (dapp, contract) = classify_title(title.as_deref());
                let label = AddressLabel::new(address, dapp, contract);
                self.writer
                    .append(&label)
                    .with_context(|| format!("failed to append label for {}", address))?;
                self.known.insert(label.clone());
                info!(address, dapp = %label.dapp, contract = %label.contract, "labeled");
                Ok(LabelOutcome::Labeled(label))
            }
            Err(e) => {
                warn!(address, "lookup failed: {}", e);
                Ok(LabelOutcome::LookupFailed {
                    address: address.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn lookup_title(&mut self, address: &str) -> Result<Option<String>, LookupError> {
        let url = format!("{}/{}", self.base_url, address);
        let client = &self.client;
        let agents = &mut self.agents;
        self.retry
            .run(address, LookupError::is_transient, || {
                let mut request = client.get(&url);
                if let Some(ua) = agents.pick() {
                    request = request.header(reqwest::header::USER_AGENT, ua);
                }
                async move {
                    let resp = request.send().await?;
                    let status = resp.status();
                    if !status.is_success() {
                        return Err(LookupError::Status(status.as_u16()));
                    }
                    let html = resp.text().await?;
                    if html.contains(RATE_LIMIT_MARKER) {
                        return Err(LookupError::RateLimited);
                    }
                    Ok(extract_title(&html))
                }
            })
            .await
    }
}

/// Read candidate addresses: one per line, blank lines and `#` comments ignored.
pub fn read_address_list(path: &Path) -> anyhow::Result<Vec<String>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read address list: {}", path.display()))?;
    Ok(parse_address_list(&data))
}

pub fn parse_address_list(data: &str) -> Vec<String> {
    data.lines()
        .map(|l| l.split('#').next().unwrap_or_default().trim())
        .filter(|l| !l.is_empty())
        .map(normalize_address)
        .collect()
}
