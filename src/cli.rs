use std::path::PathBuf;

use anyhow::{anyhow, Context, Result as AnyhowResult};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;

use crate::config::{PipelineContext, Region};
use crate::filter::expr::FilterExpr;
use crate::genome::FaidxIndelContext;
use crate::logging::init_logging;
use crate::score::{ScorerOptions, VariantType as ScoreVariantType};
use crate::som::engine::{DEFAULT_ACTIVATION_THRESHOLD, DEFAULT_BINS, DEFAULT_ENSEMBLE, DEFAULT_LEARN_RATE};
use crate::stats::dist;
use crate::table::catalog::AnnotationCatalog;
use crate::table::goodmask::GoodMask;
use crate::train::{train, TrainerOptions};

#[derive(Parser)]
#[command(name = "somfilter", version, about = "SOM-based variant quality filter")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
    /// Write debug-level logs to this file instead of stderr.
    #[arg(long, global = true)]
    pub log_filepath: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum VariantTypeArg {
    Snp,
    Indel,
}

impl From<VariantTypeArg> for ScoreVariantType {
    fn from(v: VariantTypeArg) -> Self {
        match v {
            VariantTypeArg::Snp => ScoreVariantType::Snp,
            VariantTypeArg::Indel => ScoreVariantType::Indel,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Build (or reuse) the per-annotation distribution summary sidecar.
    BuildStats(BuildStats),
    /// Reservoir-sample training vectors and train a SOM ensemble.
    Train(Train),
    /// Score every fully-present site and write the sites file.
    Score(Score),
    /// Sweep a threshold over the sites file and emit the metric table.
    Evaluate(Evaluate),
    /// Run build-stats, train, score, and evaluate in sequence.
    Run(Run),
    /// Apply a chosen cutoff to a query; demonstration only.
    Apply(Apply),
}

impl Command {
    pub fn run(&self, log_filepath: Option<&std::path::Path>) -> AnyhowResult<()> {
        let _handle = init_logging(log_filepath);
        match self {
            Command::BuildStats(x) => x.run(),
            Command::Train(x) => x.run(),
            Command::Score(x) => x.run(),
            Command::Evaluate(x) => x.run(),
            Command::Run(x) => x.run(),
            Command::Apply(x) => x.run(),
        }
    }
}

fn parse_good_mask(s: &str) -> Result<GoodMask, String> {
    Ok(GoodMask::parse(s))
}

#[derive(Args)]
pub struct CommonTableArgs {
    /// Path to the annotation table (plain or bgzip/gzip-compressed).
    #[arg(long)]
    pub table: PathBuf,
    /// Comma-separated annotation names to select.
    #[arg(long, value_delimiter = ',')]
    pub annotations: Vec<String>,
    /// Good-mask pattern (e.g. "010") identifying known-good truth bits.
    #[arg(long, value_parser = parse_good_mask, default_value = "1")]
    pub good_mask: GoodMask,
    /// Restrict to a `chrom:start-end` (or bare `chrom`) region.
    #[arg(long)]
    pub region: Option<String>,
}

impl CommonTableArgs {
    fn parsed_region(&self) -> AnyhowResult<Option<Region>> {
        match &self.region {
            None => Ok(None),
            Some(s) => Region::parse(s)
                .map(Some)
                .ok_or_else(|| anyhow!("invalid --region {s:?}, expected chrom or chrom:start-end")),
        }
    }
}

#[derive(Args)]
pub struct BuildStats {
    #[command(flatten)]
    pub common: CommonTableArgs,
    /// Output prefix; the sidecar is written to `<prefix>.n`.
    #[arg(long)]
    pub prefix: PathBuf,
    #[arg(long, default_value_t = dist::DEFAULT_LO_PCTL)]
    pub lo_percentile: f64,
    #[arg(long, default_value_t = dist::DEFAULT_HI_PCTL)]
    pub hi_percentile: f64,
}

impl BuildStats {
    pub fn run(&self) -> AnyhowResult<()> {
        let tmp_dir = std::env::temp_dir();
        let sidecar_path = self.prefix.with_extension("n");
        let region = self.common.parsed_region()?;
        let stats = dist::build_or_load(
            &self.common.table,
            &sidecar_path,
            self.common.good_mask,
            self.lo_percentile,
            self.hi_percentile,
            &tmp_dir,
            region.as_ref(),
        )
        .context("building distribution statistics")?;
        info!("wrote distribution summary for {} annotations to {}", stats.len(), sidecar_path.display());
        Ok(())
    }
}

#[derive(Args)]
pub struct SomArgs {
    #[arg(long, default_value_t = DEFAULT_BINS)]
    pub bins: usize,
    #[arg(long, default_value_t = DEFAULT_LEARN_RATE)]
    pub learn_rate: f64,
    #[arg(long, default_value_t = DEFAULT_ACTIVATION_THRESHOLD)]
    pub activation_threshold: f64,
    #[arg(long, default_value_t = DEFAULT_ENSEMBLE)]
    pub ensemble: usize,
    /// Explicit PRNG seed; 0 selects a wall-clock-derived seed (logged).
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

#[derive(Args)]
pub struct Train {
    #[command(flatten)]
    pub common: CommonTableArgs,
    #[arg(long)]
    pub prefix: PathBuf,
    #[command(flatten)]
    pub som: SomArgs,
    #[arg(long, default_value_t = 100_000)]
    pub train_size: u64,
    #[arg(long, default_value_t = 0.3)]
    pub learn_fraction: f64,
    /// Predicate expression selecting which non-GOOD sites may enter the
    /// LEARN reservoir.
    #[arg(long, default_value = "")]
    pub learning_filter: String,
}

fn resolve_seed(seed: u64) -> u64 {
    if seed == 0 {
        let resolved = std::process::id() as u64 ^ 0x9E3779B97F4A7C15;
        log::warn!("seed 0 given; using wall-clock/process-derived seed {resolved}");
        resolved
    } else {
        seed
    }
}

impl Train {
    pub fn run(&self) -> AnyhowResult<()> {
        let sidecar_path = self.prefix.with_extension("n");
        let stats = dist::load(&sidecar_path).context("loading distribution sidecar")?;

        let header_columns = table_header_columns(&self.common.table)?;
        let mut catalog = AnnotationCatalog::build(&header_columns, &self.common.annotations)?;
        let n_som_slots = catalog.n_selected();
        let som_slots: Vec<usize> = (0..n_som_slots).collect();

        let learning_filter = FilterExpr::parse(
            &self.learning_filter,
            &mut catalog,
            &header_columns,
            false,
            |name| scaler_for_name(&stats, name),
        )?;

        // `learning_filter` may have grown `catalog` past the SOM's own
        // annotation selection; the table reader must be opened against
        // that same, possibly-larger selection so predicate slots stay in
        // bounds.
        let requested: Vec<String> = catalog.names().map(str::to_owned).collect();
        let scalers = dist::scalers_for(&stats, &requested)?;

        let options = TrainerOptions {
            n_total: self.train_size,
            learn_fraction: self.learn_fraction,
            seed: resolve_seed(self.som.seed),
            bins: self.som.bins,
            ensemble: self.som.ensemble,
            learn_rate0: self.som.learn_rate,
            activation_threshold: self.som.activation_threshold,
        };

        let region = self.common.parsed_region()?;
        let ensemble = train(
            &self.common.table,
            &requested,
            self.common.good_mask,
            scalers,
            &som_slots,
            &learning_filter,
            options,
            region.as_ref(),
        )?;

        let ensemble_path = self.prefix.with_extension("som.json");
        let file = std::fs::File::create(&ensemble_path)?;
        serde_json::to_writer(file, &ensemble).context("persisting SOM ensemble")?;
        info!("trained SOM ensemble written to {}", ensemble_path.display());
        Ok(())
    }
}

fn table_header_columns(table_path: &std::path::Path) -> AnyhowResult<Vec<String>> {
    use std::io::BufRead;
    let mut source = crate::table::source::open_table(table_path)?;
    let mut header_line = String::new();
    source.read_line(&mut header_line)?;
    Ok(crate::table::reader::parse_header_line(&header_line)?)
}

fn scaler_for_name(
    stats: &indexmap::IndexMap<String, dist::DistributionStats>,
    name: &str,
) -> Option<crate::stats::scale::Scaler> {
    let s = stats.get(name)?;
    Some(crate::stats::scale::Scaler::new(s.scale_lo, s.scale_hi))
}

#[derive(Args)]
pub struct Score {
    #[command(flatten)]
    pub common: CommonTableArgs,
    #[arg(long)]
    pub prefix: PathBuf,
    #[arg(long, value_enum, default_value_t = VariantTypeArg::Snp)]
    pub variant_type: VariantTypeArg,
    /// faidx-indexed reference FASTA; required for `--variant-type indel`.
    #[arg(long)]
    pub reference: Option<PathBuf>,
    /// Optional fixed hard-filter expression applied at scoring time.
    #[arg(long, default_value = "")]
    pub fixed_filter: String,
}

impl Score {
    pub fn run(&self) -> AnyhowResult<()> {
        let sidecar_path = self.prefix.with_extension("n");
        let stats = dist::load(&sidecar_path).context("loading distribution sidecar")?;

        let ensemble_path = self.prefix.with_extension("som.json");
        let file = std::fs::File::open(&ensemble_path)
            .with_context(|| format!("opening trained ensemble {}", ensemble_path.display()))?;
        let ensemble: crate::som::engine::SomEnsemble = serde_json::from_reader(file)?;

        let header_columns = table_header_columns(&self.common.table)?;
        let mut catalog = AnnotationCatalog::build(&header_columns, &self.common.annotations)?;
        let n_som_slots = catalog.n_selected();
        let som_slots: Vec<usize> = (0..n_som_slots).collect();

        let fixed_filter = FilterExpr::parse(
            &self.fixed_filter,
            &mut catalog,
            &header_columns,
            false,
            |name| scaler_for_name(&stats, name),
        )?;

        // `fixed_filter` may reference an annotation outside the SOM's own
        // selection; reopen against the catalog's final, possibly-grown
        // selection so the reader's dense vectors cover every predicate slot.
        let requested: Vec<String> = catalog.names().map(str::to_owned).collect();
        let scalers = dist::scalers_for(&stats, &requested)?;

        let variant_type: ScoreVariantType = self.variant_type.into();
        let indel_context = match (&variant_type, &self.reference) {
            (ScoreVariantType::Indel, Some(reference)) => Some(FaidxIndelContext::open(reference)?),
            (ScoreVariantType::Indel, None) => {
                return Err(anyhow!("--reference is required for --variant-type indel"))
            }
            _ => None,
        };
        let indel_provider: Option<&dyn crate::genome::IndelContextProvider> =
            indel_context.as_ref().map(|p| p as &dyn crate::genome::IndelContextProvider);

        let region = self.common.parsed_region()?;
        let sites_path = path_with_suffix(&self.prefix, ".sites.gz");
        crate::score::score(
            &self.common.table,
            &requested,
            self.common.good_mask,
            scalers,
            &ensemble,
            &sites_path,
            indel_provider,
            ScorerOptions {
                variant_type,
                som_slots: &som_slots,
                fixed_filter: &fixed_filter,
            },
            &std::env::args().collect::<Vec<_>>().join(" "),
            region.as_ref(),
        )?;
        info!("wrote scored sites to {}", sites_path.display());
        Ok(())
    }
}

fn path_with_suffix(prefix: &std::path::Path, suffix: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

#[derive(Args)]
pub struct Evaluate {
    #[arg(long)]
    pub prefix: PathBuf,
    #[arg(long, value_enum, default_value_t = VariantTypeArg::Snp)]
    pub variant_type: VariantTypeArg,
}

impl Evaluate {
    pub fn run(&self) -> AnyhowResult<()> {
        let sites_path = path_with_suffix(&self.prefix, ".sites.gz");
        let tab_path = self.prefix.with_extension("tab");
        crate::eval::evaluate(
            &sites_path,
            self.variant_type.into(),
            &tab_path,
            &std::env::args().collect::<Vec<_>>().join(" "),
        )?;
        info!("wrote threshold-sweep table to {}", tab_path.display());
        Ok(())
    }
}

#[derive(Args)]
pub struct Run {
    #[command(flatten)]
    pub common: CommonTableArgs,
    #[arg(long)]
    pub prefix: PathBuf,
    #[command(flatten)]
    pub som: SomArgs,
    #[arg(long, default_value_t = 100_000)]
    pub train_size: u64,
    #[arg(long, default_value_t = 0.3)]
    pub learn_fraction: f64,
    #[arg(long, default_value = "")]
    pub learning_filter: String,
    #[arg(long, default_value = "")]
    pub fixed_filter: String,
    #[arg(long, value_enum, default_value_t = VariantTypeArg::Snp)]
    pub variant_type: VariantTypeArg,
    #[arg(long)]
    pub reference: Option<PathBuf>,
}

impl Run {
    pub fn run(&self) -> AnyhowResult<()> {
        let region = self.common.parsed_region()?;
        let _ctx = PipelineContext::new(
            self.common.table.clone(),
            self.prefix.clone(),
            self.common.annotations.clone(),
            self.common.good_mask,
            resolve_seed(self.som.seed),
            region,
        );

        BuildStats {
            common: CommonTableArgs {
                table: self.common.table.clone(),
                annotations: self.common.annotations.clone(),
                good_mask: self.common.good_mask,
                region: self.common.region.clone(),
            },
            prefix: self.prefix.clone(),
            lo_percentile: dist::DEFAULT_LO_PCTL,
            hi_percentile: dist::DEFAULT_HI_PCTL,
        }
        .run()?;

        Train {
            common: CommonTableArgs {
                table: self.common.table.clone(),
                annotations: self.common.annotations.clone(),
                good_mask: self.common.good_mask,
                region: self.common.region.clone(),
            },
            prefix: self.prefix.clone(),
            som: SomArgs {
                bins: self.som.bins,
                learn_rate: self.som.learn_rate,
                activation_threshold: self.som.activation_threshold,
                ensemble: self.som.ensemble,
                seed: self.som.seed,
            },
            train_size: self.train_size,
            learn_fraction: self.learn_fraction,
            learning_filter: self.learning_filter.clone(),
        }
        .run()?;

        Score {
            common: CommonTableArgs {
                table: self.common.table.clone(),
                annotations: self.common.annotations.clone(),
                good_mask: self.common.good_mask,
                region: self.common.region.clone(),
            },
            prefix: self.prefix.clone(),
            variant_type: self.variant_type,
            reference: self.reference.clone(),
            fixed_filter: self.fixed_filter.clone(),
        }
        .run()?;

        Evaluate {
            prefix: self.prefix.clone(),
            variant_type: self.variant_type,
        }
        .run()
    }
}

#[derive(Args)]
pub struct Apply {
    /// `<prefix>.sites.gz` from a `score --variant-type snp` run.
    #[arg(long)]
    pub snp_sites: Option<PathBuf>,
    /// `<prefix>.sites.gz` from a `score --variant-type indel` run.
    #[arg(long)]
    pub indel_sites: Option<PathBuf>,
    #[arg(long)]
    pub snp_cutoff: f64,
    #[arg(long)]
    pub indel_cutoff: f64,
    /// Tab-delimited query to read (defaults to stdin); column 1 = CHROM,
    /// column 2 = POS, matching the sites files' key.
    #[arg(long)]
    pub query: Option<PathBuf>,
    #[arg(long)]
    pub region: Option<String>,
    /// Reset any unrecognized pre-existing FILTER value before stamping
    /// PASS/FailSOM; acknowledged but a no-op in this line-oriented
    /// demonstration, see `apply::run`'s doc comment.
    #[arg(long, default_value_t = false)]
    pub reset_filters: bool,
}

impl Apply {
    pub fn run(&self) -> AnyhowResult<()> {
        if self.snp_sites.is_none() && self.indel_sites.is_none() {
            return Err(anyhow!("at least one of --snp-sites or --indel-sites is required"));
        }
        let query_region = self.region.as_deref().and_then(Region::parse);
        let cutoffs = crate::apply::ApplyCutoffs {
            snp_cutoff: self.snp_cutoff,
            indel_cutoff: self.indel_cutoff,
        };
        let inputs = crate::apply::ApplyInputs::load(self.snp_sites.as_deref(), self.indel_sites.as_deref())?;
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        match &self.query {
            Some(path) => {
                let file = std::fs::File::open(path)?;
                crate::apply::run(
                    &inputs,
                    std::io::BufReader::new(file),
                    stdout.lock(),
                    &cutoffs,
                    self.reset_filters,
                    None,
                    query_region.as_ref(),
                )?;
            }
            None => {
                crate::apply::run(
                    &inputs,
                    stdin.lock(),
                    stdout.lock(),
                    &cutoffs,
                    self.reset_filters,
                    None,
                    query_region.as_ref(),
                )?;
            }
        }
        Ok(())
    }
}
