//! Integration pipeline: normalize open-data exports, reconcile them against
//! the PLACE baseline, augment Catalonia tenders from their publication
//! documents, and export unified minors/outsiders tables.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sproc_adapters::{
    catalonia, madrid, zaragoza, CataloniaNormalizer, CodeMapper, CodeTables, MadridNormalizer,
    SourceNormalizer, ZaragozaNormalizer,
};
use sproc_core::{ContractRecord, SourceTag};
use sproc_storage::{DocumentSource, HttpClientConfig, HttpFetcher, RetryPolicy};
use tokio::fs;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod augment;
pub mod enrich;
pub mod matching;
pub mod sink;
pub mod unify;

pub use augment::{AugmentStats, FailedLookup, RemoteAugmenter, EXHAUSTED_MARKER, INVALID_POINTER_MARKER};
pub use enrich::{EnrichmentMapping, FieldEnricher, SubstitutionLedger};
pub use matching::{LinkOutcome, MatchIndexBuilder, MatchKey, RecordLinker};
pub use sink::{ContractSink, ParquetSink};
pub use unify::{SchemaPolicy, SchemaUnifier};

pub const CRATE_NAME: &str = "sproc-sync";

pub const PLACE_MINORS_FILE: &str = "minors.parquet";
pub const PLACE_OUTSIDERS_FILE: &str = "outsiders.parquet";
pub const MINORS_TABLE: &str = "minors";
pub const OUTSIDERS_TABLE: &str = "outsiders";
pub const FAILED_LOOKUPS_FILE: &str = "failed_urls.csv";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const SUMMARY_FILE: &str = "integration_summary.md";
pub const CODE_TABLES_FILE: &str = "code_tables.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    pub enabled: bool,
    /// File names, or for Catalonia a fragment matched against `*.csv` names.
    #[serde(default)]
    pub input_files: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SourceRegistry {
    pub fn enabled(&self, source_id: &str) -> Option<&SourceConfig> {
        self.sources
            .iter()
            .find(|s| s.source_id == source_id && s.enabled)
    }
}

/// Which open-data branches a run processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Administration {
    Zaragoza,
    Madrid,
    Gencat,
    All,
}

impl Administration {
    pub fn as_str(self) -> &'static str {
        match self {
            Administration::Zaragoza => "zaragoza",
            Administration::Madrid => "madrid",
            Administration::Gencat => "gencat",
            Administration::All => "all",
        }
    }

    pub fn includes(self, source_id: &str) -> bool {
        match self {
            Administration::All => true,
            Administration::Zaragoza => source_id == zaragoza::SOURCE_ID,
            Administration::Madrid => source_id == madrid::SOURCE_ID,
            Administration::Gencat => source_id == catalonia::SOURCE_ID,
        }
    }
}

impl fmt::Display for Administration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Administration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zaragoza" => Ok(Administration::Zaragoza),
            "madrid" => Ok(Administration::Madrid),
            "gencat" | "catalonia" => Ok(Administration::Gencat),
            "all" => Ok(Administration::All),
            other => Err(format!(
                "unknown administration `{other}` (expected zaragoza, madrid, gencat or all)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntegrationConfig {
    pub input_dir: PathBuf,
    pub place_dir: PathBuf,
    pub output_dir: PathBuf,
    pub workspace_root: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub fetch_max_attempts: usize,
    pub fetch_retry_delay_secs: u64,
    pub administration: Administration,
}

impl IntegrationConfig {
    pub fn from_env() -> Self {
        Self {
            input_dir: env_path("SPROC_INPUT_DIR", "./input"),
            place_dir: env_path("SPROC_PLACE_DIR", "./place"),
            output_dir: env_path("SPROC_OUTPUT_DIR", "./output"),
            workspace_root: env_path("SPROC_WORKSPACE_ROOT", "."),
            user_agent: std::env::var("SPROC_USER_AGENT")
                .unwrap_or_else(|_| "sproc-integration/0.1".to_string()),
            http_timeout_secs: env_parse("SPROC_HTTP_TIMEOUT_SECS", 10),
            fetch_max_attempts: env_parse("SPROC_FETCH_MAX_ATTEMPTS", 3),
            fetch_retry_delay_secs: env_parse("SPROC_FETCH_RETRY_DELAY_SECS", 2),
            administration: std::env::var("SPROC_ADMINISTRATION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(Administration::All),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.fetch_max_attempts,
            Duration::from_secs(self.fetch_retry_delay_secs),
        )
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Record counts at each stage boundary of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageCounts {
    pub loaded: BTreeMap<String, usize>,
    pub rejected: BTreeMap<String, usize>,
    pub skipped_branches: Vec<String>,
    pub deduplicated: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub enriched: usize,
    pub minors: usize,
    pub outsiders: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrationSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub administration: Administration,
    pub counts: StageCounts,
    pub substitutions: SubstitutionLedger,
    pub augmentation: AugmentStats,
    pub failed_lookups: usize,
    pub output_dir: String,
    pub manifest: String,
}

/// What the Catalonia branch hands back to the run.
struct CataloniaOutcome {
    minors: Vec<ContractRecord>,
    outsiders: Vec<ContractRecord>,
    failed: Vec<FailedLookup>,
    ledger: SubstitutionLedger,
    stats: AugmentStats,
}

pub struct IntegrationPipeline {
    config: IntegrationConfig,
    codes: Arc<CodeMapper>,
    documents: Arc<dyn DocumentSource>,
    retry: RetryPolicy,
    sink: Box<dyn ContractSink>,
    index: MatchIndexBuilder,
    linker: RecordLinker,
    enricher: FieldEnricher,
    unifier: SchemaUnifier,
}

impl IntegrationPipeline {
    /// Loads the code tables from `rules/` and builds the HTTP document source.
    pub fn new(config: IntegrationConfig) -> Result<Self> {
        let tables_path = config.workspace_root.join("rules").join(CODE_TABLES_FILE);
        let tables = CodeTables::load(&tables_path)
            .with_context(|| format!("loading code tables {}", tables_path.display()))?;
        let retry = config.retry_policy();
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            retry,
        })?;
        let sink = Box::new(ParquetSink::new(config.output_dir.clone()));
        Ok(Self {
            config,
            codes: Arc::new(CodeMapper::new(tables)),
            documents: Arc::new(http),
            retry,
            sink,
            index: MatchIndexBuilder::default(),
            linker: RecordLinker::default(),
            enricher: FieldEnricher::new(EnrichmentMapping::default()),
            unifier: SchemaUnifier::default(),
        })
    }

    pub fn with_document_source(mut self, documents: Arc<dyn DocumentSource>, retry: RetryPolicy) -> Self {
        self.documents = documents;
        self.retry = retry;
        self
    }

    pub fn with_enrichment(mut self, mapping: EnrichmentMapping) -> Self {
        self.enricher = FieldEnricher::new(mapping);
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn ContractSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_schema_policy(mut self, policy: SchemaPolicy) -> Self {
        self.unifier = SchemaUnifier::new(policy);
        self
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    pub async fn run_once(&self) -> Result<IntegrationSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let registry = self.load_source_registry().await?;
        let mut counts = StageCounts::default();

        let mut minors = self.load_baseline(PLACE_MINORS_FILE, &mut counts);
        let mut outsiders = self.load_baseline(PLACE_OUTSIDERS_FILE, &mut counts);

        if let Some(source) = self.branch(&registry, zaragoza::SOURCE_ID) {
            let span = info_span!("branch", source = zaragoza::SOURCE_ID);
            let _guard = span.enter();
            match self.zaragoza_branch(source, &mut counts) {
                Ok(records) => minors.extend(records),
                Err(err) => skip_branch(&mut counts, zaragoza::SOURCE_ID, &err),
            }
        }

        if let Some(source) = self.branch(&registry, madrid::SOURCE_ID) {
            let span = info_span!("branch", source = madrid::SOURCE_ID);
            let _guard = span.enter();
            match self.madrid_branch(source, &mut counts) {
                Ok(records) => minors.extend(records),
                Err(err) => skip_branch(&mut counts, madrid::SOURCE_ID, &err),
            }
        }

        let mut failed = Vec::new();
        let mut substitutions = SubstitutionLedger::default();
        let mut augmentation = AugmentStats::default();
        if let Some(source) = self.branch(&registry, catalonia::SOURCE_ID) {
            let span = info_span!("branch", source = catalonia::SOURCE_ID);
            match self
                .catalonia_branch(source, &outsiders, &mut counts)
                .instrument(span)
                .await
            {
                Ok(outcome) => {
                    minors.extend(outcome.minors);
                    outsiders = outcome.outsiders;
                    failed = outcome.failed;
                    substitutions = outcome.ledger;
                    augmentation = outcome.stats;
                }
                Err(err) => skip_branch(&mut counts, catalonia::SOURCE_ID, &err),
            }
        }

        counts.minors = minors.len();
        counts.outsiders = outsiders.len();
        info!(minors = counts.minors, outsiders = counts.outsiders, "final record counts");

        let manifest_path = self.write_outputs(run_id, &minors, &outsiders, &failed).await?;
        let summary = IntegrationSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            administration: self.config.administration,
            counts,
            substitutions,
            augmentation,
            failed_lookups: failed.len(),
            output_dir: self.config.output_dir.display().to_string(),
            manifest: manifest_path.display().to_string(),
        };
        let summary_path = self.config.output_dir.join(SUMMARY_FILE);
        fs::write(&summary_path, summary_markdown(&summary))
            .await
            .with_context(|| format!("writing {}", summary_path.display()))?;
        Ok(summary)
    }

    async fn load_source_registry(&self) -> Result<SourceRegistry> {
        let path = self.config.workspace_root.join("sources.yaml");
        let text = fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    fn branch<'a>(&self, registry: &'a SourceRegistry, source_id: &str) -> Option<&'a SourceConfig> {
        if !self.config.administration.includes(source_id) {
            return None;
        }
        let source = registry.enabled(source_id);
        if source.is_none() {
            info!(source = source_id, "source disabled or not registered");
        }
        source
    }

    fn load_baseline(&self, file: &str, counts: &mut StageCounts) -> Vec<ContractRecord> {
        let path = self.config.place_dir.join(file);
        if !path.exists() {
            warn!(path = %path.display(), "baseline file missing, using an empty baseline");
            return Vec::new();
        }
        match sink::read_contracts(&path, SourceTag::Place) {
            Ok(records) => {
                info!(path = %path.display(), records = records.len(), "loaded baseline");
                counts.loaded.insert(format!("place/{file}"), records.len());
                records
            }
            Err(err) => {
                warn!(path = %path.display(), error = %format!("{err:#}"), "unreadable baseline, using an empty baseline");
                Vec::new()
            }
        }
    }

    fn normalize(
        &self,
        normalizer: &dyn SourceNormalizer,
        rows: &[serde_json::Value],
        counts: &mut StageCounts,
    ) -> Vec<ContractRecord> {
        let batch = normalizer.normalize_all(rows);
        for (index, err) in &batch.rejected {
            warn!(row = index, error = %err, "rejected row");
        }
        let source_id = normalizer.source_id().to_string();
        *counts.loaded.entry(source_id.clone()).or_default() += batch.records.len();
        if !batch.rejected.is_empty() {
            *counts.rejected.entry(source_id).or_default() += batch.rejected.len();
        }
        info!(records = batch.records.len(), rejected = batch.rejected.len(), "normalized");
        batch.records
    }

    fn zaragoza_branch(&self, source: &SourceConfig, counts: &mut StageCounts) -> Result<Vec<ContractRecord>> {
        let file = source
            .input_files
            .first()
            .map(String::as_str)
            .unwrap_or(zaragoza::DEFAULT_INPUT_FILE);
        let path = self.config.input_dir.join(file);
        if !path.exists() {
            bail!("input file {} not found", path.display());
        }
        let rows = zaragoza::load_contracts(&path)?;
        let normalizer = ZaragozaNormalizer::new(self.codes.clone());
        Ok(self.normalize(&normalizer, &rows, counts))
    }

    /// Every listed workbook must be present; one missing file skips the branch.
    fn madrid_branch(&self, source: &SourceConfig, counts: &mut StageCounts) -> Result<Vec<ContractRecord>> {
        let files: Vec<&str> = if source.input_files.is_empty() {
            madrid::WORKBOOKS.iter().map(|w| w.file_name).collect()
        } else {
            source.input_files.iter().map(String::as_str).collect()
        };

        let mut loaded = Vec::with_capacity(files.len());
        for file in files {
            let workbook = madrid::workbook_for_file(file)
                .with_context(|| format!("no Madrid layout registered for {file}"))?;
            let path = self.config.input_dir.join(file);
            if !path.exists() {
                bail!("input file {} not found", path.display());
            }
            loaded.push((workbook, madrid::load_workbook(&path, workbook)?));
        }

        let mut records = Vec::new();
        for (workbook, rows) in loaded {
            let normalizer = MadridNormalizer::new(workbook.layout, self.codes.clone());
            records.extend(self.normalize(&normalizer, &rows, counts));
        }
        Ok(records)
    }

    async fn catalonia_branch(
        &self,
        source: &SourceConfig,
        baseline_outsiders: &[ContractRecord],
        counts: &mut StageCounts,
    ) -> Result<CataloniaOutcome> {
        let fragment = source
            .input_files
            .first()
            .map(String::as_str)
            .unwrap_or(catalonia::DEFAULT_FILE_FRAGMENT);
        let Some(path) = catalonia::find_export(&self.config.input_dir, fragment)? else {
            bail!(
                "no Catalonia export matching `{fragment}` in {}",
                self.config.input_dir.display()
            );
        };
        let rows = catalonia::load_rows(&path)?;
        let records = self.normalize(&CataloniaNormalizer::new(self.codes.clone()), &rows, counts);

        let loaded = records.len();
        let prepared = self.linker.prepare(self.index.index(records));
        counts.deduplicated = prepared.len();
        info!(loaded, deduplicated = prepared.len(), "grouped lot rows");

        let augmenter = RemoteAugmenter::new(self.documents.clone(), self.retry);
        let augmented = augmenter
            .augment_all(prepared.into_iter().map(|row| row.record).collect())
            .await;

        let (minors, candidates): (Vec<_>, Vec<_>) = augmented
            .records
            .into_iter()
            .partition(catalonia::is_minor_contract);

        let baseline = self.index.index(baseline_outsiders.to_vec());
        let outcome = self.linker.link(&baseline, self.index.index(candidates));
        counts.matched = outcome.matched.len();
        counts.unmatched = outcome.unmatched.len();
        info!(matched = counts.matched, unmatched = counts.unmatched, "linked against baseline outsiders");

        let (enriched, ledger) = self.enricher.enrich(&outcome.matched);
        counts.enriched = enriched.len();
        info!(enriched = counts.enriched, substitutions = ledger.total(), "enriched baseline outsiders");
        for (field, substitutions) in ledger.entries() {
            info!(field, substitutions, "enriched field");
        }

        let mut outsiders: Vec<ContractRecord> = baseline.into_iter().map(|row| row.record).collect();
        for row in enriched {
            outsiders[row.baseline_index] = row.record;
        }
        outsiders.extend(outcome.unmatched.into_iter().map(|row| row.record));

        Ok(CataloniaOutcome {
            minors,
            outsiders,
            failed: augmented.failed,
            ledger,
            stats: augmented.stats,
        })
    }

    async fn write_outputs(
        &self,
        run_id: Uuid,
        minors: &[ContractRecord],
        outsiders: &[ContractRecord],
        failed: &[FailedLookup],
    ) -> Result<PathBuf> {
        let output_dir = &self.config.output_dir;
        fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("creating {}", output_dir.display()))?;

        let minors_path = self
            .sink
            .write_table(MINORS_TABLE, &self.unifier.unify(minors))?;
        let outsiders_path = self
            .sink
            .write_table(OUTSIDERS_TABLE, &self.unifier.unify(outsiders))?;
        let failed_path = output_dir.join(FAILED_LOOKUPS_FILE);
        sink::write_failed_lookups(&failed_path, failed)?;

        let manifest = sink::OutputManifest {
            schema_version: 1,
            run_id: run_id.to_string(),
            files: vec![
                sink::manifest_entry(MINORS_TABLE, output_dir, &minors_path)?,
                sink::manifest_entry(OUTSIDERS_TABLE, output_dir, &outsiders_path)?,
                sink::manifest_entry("failed_urls", output_dir, &failed_path)?,
            ],
        };
        let manifest_path = output_dir.join(MANIFEST_FILE);
        let bytes = serde_json::to_vec_pretty(&manifest).context("serializing output manifest")?;
        fs::write(&manifest_path, bytes)
            .await
            .with_context(|| format!("writing {}", manifest_path.display()))?;
        Ok(manifest_path)
    }
}

fn skip_branch(counts: &mut StageCounts, source_id: &str, err: &anyhow::Error) {
    warn!(source = source_id, error = %format!("{err:#}"), "skipping source branch");
    counts.skipped_branches.push(source_id.to_string());
}

pub fn summary_markdown(summary: &IntegrationSummary) -> String {
    let bullets = |map: &BTreeMap<String, usize>| {
        if map.is_empty() {
            "- none".to_string()
        } else {
            map.iter()
                .map(|(k, v)| format!("- {k}: {v}"))
                .collect::<Vec<_>>()
                .join("\n")
        }
    };
    let substitutions = summary
        .substitutions
        .entries()
        .map(|(field, n)| format!("- `{field}`: {n}"))
        .collect::<Vec<_>>();
    let skipped = if summary.counts.skipped_branches.is_empty() {
        "none".to_string()
    } else {
        summary.counts.skipped_branches.join(", ")
    };
    let a = &summary.augmentation;

    format!(
        "# Integration Summary\n\n- Run ID: `{}`\n- Started: {}\n- Finished: {}\n- Administration: {}\n- Skipped branches: {}\n\n## Loaded\n{}\n\n## Rejected\n{}\n\n## Linking\n- deduplicated: {}\n- matched: {}\n- unmatched: {}\n- enriched: {}\n\n## Augmentation\n- augmented: {}\n- partial: {}\n- exhausted: {}\n- invalid: {}\n- skipped: {}\n- failed lookups: {}\n\n## Substitutions\n{}\n\n## Output\n- minors: {}\n- outsiders: {}\n- manifest: `{}`\n",
        summary.run_id,
        summary.started_at,
        summary.finished_at,
        summary.administration,
        skipped,
        bullets(&summary.counts.loaded),
        bullets(&summary.counts.rejected),
        summary.counts.deduplicated,
        summary.counts.matched,
        summary.counts.unmatched,
        summary.counts.enriched,
        a.augmented,
        a.partial,
        a.exhausted,
        a.invalid,
        a.skipped,
        summary.failed_lookups,
        if substitutions.is_empty() {
            "- none".to_string()
        } else {
            substitutions.join("\n")
        },
        summary.counts.minors,
        summary.counts.outsiders,
        summary.manifest,
    )
}

pub async fn run_integration(config: IntegrationConfig) -> Result<IntegrationSummary> {
    let enrichment = load_enrichment(&config.workspace_root)?;
    let pipeline = IntegrationPipeline::new(config)?.with_enrichment(enrichment);
    pipeline.run_once().await
}

pub async fn run_integration_from_env() -> Result<IntegrationSummary> {
    run_integration(IntegrationConfig::from_env()).await
}

/// Rules from `rules/enrichment.yaml` when present, else the built-in mapping.
fn load_enrichment(root: &Path) -> Result<EnrichmentMapping> {
    if root.join("rules").join(enrich::RULES_FILE).exists() {
        EnrichmentMapping::from_workspace_root(root)
    } else {
        info!("no enrichment rules file, using built-in mapping");
        Ok(EnrichmentMapping::default())
    }
}
