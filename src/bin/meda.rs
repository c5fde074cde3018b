//! meda - Metabolomics EDA preprocessing CLI
//!
//! Command-line interface for reshaping, preprocessing and testing
//! metabolomics sheets.

use clap::{Parser, Subcommand};
use metabo_eda::align::validate_alignment;
use metabo_eda::cache::ResultCache;
use metabo_eda::config::Config;
use metabo_eda::data::Dataset;
use metabo_eda::diagnostics::Diagnostics;
use metabo_eda::error::Result;
use metabo_eda::labels::{DIABETES, HEALTHY};
use metabo_eda::pipeline::{Pipeline, PipelineOutput};
use metabo_eda::preprocess::PreprocessOptions;
use metabo_eda::reconcile::ReconcileOptions;
use metabo_eda::stats::{pca, pca_for_classes, univariate_2class};
use metabo_eda::summary::StudySummary;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Metabolomics EDA preprocessing
#[derive(Parser)]
#[command(name = "meda")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration YAML (defaults are used when absent)
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Override the data directory from the configuration
    #[arg(short, long, global = true)]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Result cache options shared by the analysis commands.
#[derive(clap::Args)]
struct CacheArgs {
    /// Recompute even when a cached result exists
    #[arg(long)]
    no_cache: bool,

    /// Cache directory (default: user cache directory)
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile and preprocess the sheets, writing the feature table and matrix
    Run {
        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        cache: CacheArgs,
    },

    /// Check sample identifier overlap between metadata and matrix
    Validate,

    /// Two-class univariate test per compound
    Univariate {
        /// Output path for the full results TSV
        #[arg(short, long)]
        output: PathBuf,

        /// Positive class (Diabetes or Healthy)
        #[arg(long, default_value = DIABETES)]
        posclass: String,

        /// Use Mann-Whitney U instead of the configured test
        #[arg(long)]
        nonparametric: bool,

        /// P-value threshold for the significant subset (default: from config)
        #[arg(long)]
        threshold: Option<f64>,

        #[command(flatten)]
        cache: CacheArgs,
    },

    /// Two-component PCA of the analysis matrix
    Pca {
        /// Output path for the scores TSV
        #[arg(short, long)]
        output: PathBuf,

        /// Only Healthy and Diabetes samples, rescaled on their own
        #[arg(long)]
        two_class: bool,

        #[command(flatten)]
        cache: CacheArgs,
    },

    /// Class counts, sex by class, clinical summaries and pathway counts
    Summary {
        /// Also write the tables as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the default configuration as YAML
    ExampleConfig,

    /// Remove all cached results
    ClearCache {
        /// Cache directory (default: user cache directory)
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Run { output, cache } => {
            load_config(&cli).and_then(|(config, diag)| cmd_run(&config, diag, output, cache))
        }
        Commands::Validate => {
            load_config(&cli).and_then(|(config, diag)| cmd_validate(&config, diag))
        }
        Commands::Univariate {
            output,
            posclass,
            nonparametric,
            threshold,
            cache,
        } => load_config(&cli).and_then(|(config, diag)| {
            cmd_univariate(&config, diag, output, posclass, *nonparametric, *threshold, cache)
        }),
        Commands::Pca {
            output,
            two_class,
            cache,
        } => load_config(&cli)
            .and_then(|(config, diag)| cmd_pca(&config, diag, output, *two_class, cache)),
        Commands::Summary { output } => load_config(&cli)
            .and_then(|(config, diag)| cmd_summary(&config, diag, output.as_deref())),
        Commands::ExampleConfig => cmd_example_config(),
        Commands::ClearCache { cache_dir } => cmd_clear_cache(cache_dir.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Load the configuration, returning the warnings raised while doing so
/// so each command can report them with its own.
fn load_config(cli: &Cli) -> Result<(Config, Diagnostics)> {
    let mut diagnostics = Diagnostics::new();
    let mut config = Config::load(&cli.config, &mut diagnostics)?;
    if let Some(data) = &cli.data {
        config.data.path = data.clone();
    }
    Ok((config, diagnostics))
}

fn result_cache(args: &CacheArgs) -> ResultCache {
    match &args.cache_dir {
        Some(dir) => ResultCache::new(dir),
        None => ResultCache::default_location(),
    }
}

/// Load the sheets and run the pipeline, going through the result cache
/// unless disabled.
fn load_output(
    config: &Config,
    mut diagnostics: Diagnostics,
    args: &CacheArgs,
) -> Result<PipelineOutput> {
    let dataset = Dataset::load(config, &mut diagnostics)?;
    eprintln!(
        "  {} samples in metadata, {} x {} raw matrix, {} dictionary rows",
        dataset.metadata.n_rows(),
        dataset.matrix.n_rows(),
        dataset.matrix.n_columns(),
        dataset.dictionary.n_rows()
    );

    let cache = result_cache(args);
    let key = ResultCache::key(dataset.sources(), config)?;
    if !args.no_cache {
        if let Some(mut output) = cache.get::<PipelineOutput>(&key) {
            eprintln!("Using cached result {}", key);
            diagnostics.extend(output.diagnostics);
            output.diagnostics = diagnostics;
            return Ok(output);
        }
    }

    eprintln!("Running pipeline...");
    let mut output = Pipeline::from_config(config).run(&dataset)?;
    if !args.no_cache {
        cache.put(&key, &output)?;
    }
    diagnostics.extend(output.diagnostics);
    output.diagnostics = diagnostics;
    Ok(output)
}

fn print_warnings(diagnostics: &Diagnostics) {
    if diagnostics.is_empty() {
        return;
    }
    eprintln!("{} warning(s):", diagnostics.len());
    for warning in diagnostics.warnings() {
        eprintln!("  - {}", warning);
    }
}

fn cmd_run(
    config: &Config,
    diagnostics: Diagnostics,
    output_dir: &Path,
    cache: &CacheArgs,
) -> Result<()> {
    eprintln!("Loading data from {:?}...", config.data.path);
    let output = load_output(config, diagnostics, cache)?;

    fs::create_dir_all(output_dir)?;
    let table_path = output_dir.join("feature_table.tsv");
    let matrix_path = output_dir.join("analysis_matrix.tsv");
    eprintln!("Writing results to {:?}...", output_dir);
    output.table.to_tsv(&table_path)?;
    output.matrix.to_tsv(&matrix_path)?;

    eprintln!(
        "Done! {} samples x {} features ({:?} match, scale={}, k={})",
        output.matrix.n_samples(),
        output.matrix.n_features(),
        output.alignment.strategy(),
        output.matrix.scale_method,
        output.matrix.knn_k
    );
    print_warnings(&output.diagnostics);
    Ok(())
}

fn cmd_validate(config: &Config, mut diagnostics: Diagnostics) -> Result<()> {
    let dataset = Dataset::load(config, &mut diagnostics)?;
    let options = ReconcileOptions::from_config(config);

    match validate_alignment(&dataset.metadata, &dataset.matrix, &options, &mut diagnostics) {
        Some(report) => {
            println!("Sample alignment");
            println!("================");
            println!("  Matched: {}/{}", report.matched, report.total);
            println!("  Overlap: {:.1}%", report.percent);
            println!("  Status:  {}", if report.is_low() { "LOW" } else { "OK" });
        }
        None => println!("Sample alignment could not be computed"),
    }
    print_warnings(&diagnostics);
    Ok(())
}

fn cmd_univariate(
    config: &Config,
    diagnostics: Diagnostics,
    output_path: &Path,
    posclass: &str,
    nonparametric: bool,
    threshold: Option<f64>,
    cache: &CacheArgs,
) -> Result<()> {
    let output = load_output(config, diagnostics, cache)?;
    let parametric = config.stats.parametric && !nonparametric;
    let threshold = threshold.unwrap_or(config.stats.pvalue_threshold);

    eprintln!("Running univariate test (posclass={})...", posclass);
    let results = univariate_2class(
        &output.table,
        &output.dictionary,
        &output.alignment,
        posclass,
        parametric,
    )?
    .sorted_by_pvalue();

    eprintln!("Writing results to {:?}...", output_path);
    results.to_tsv(output_path)?;

    let significant = results.significant(threshold);
    eprintln!("Done! {} compounds tested", results.len());
    eprintln!(
        "  {} significant at p <= {} and higher in {}",
        significant.len(),
        threshold,
        posclass
    );
    if !significant.is_empty() {
        eprintln!("\nTop 5 hits:");
        for r in significant.results.iter().take(5) {
            eprintln!(
                "  {} ({}): p={:.2e}",
                r.name,
                r.label.as_deref().unwrap_or("-"),
                r.p_value
            );
        }
    }
    print_warnings(&output.diagnostics);
    Ok(())
}

fn cmd_pca(
    config: &Config,
    diagnostics: Diagnostics,
    output_path: &Path,
    two_class: bool,
    cache: &CacheArgs,
) -> Result<()> {
    let mut output = load_output(config, diagnostics, cache)?;
    let (table, result) = if two_class {
        eprintln!("Restricting PCA to {} vs {}...", HEALTHY, DIABETES);
        pca_for_classes(
            &output.table,
            &output.alignment,
            &[HEALTHY, DIABETES],
            &PreprocessOptions::from_config(config),
            &mut output.diagnostics,
        )?
    } else {
        (output.table.clone(), pca(&output.matrix)?)
    };

    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "SampleID\tClass\tPC1\tPC2")?;
    for (i, sample) in result.sample_ids.iter().enumerate() {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}",
            sample,
            table.classes()[i].as_deref().unwrap_or("NA"),
            result.scores[(i, 0)],
            result.scores[(i, 1)]
        )?;
    }
    writer.flush()?;

    eprintln!(
        "Done! PC1 {:.1}%, PC2 {:.1}% of variance",
        result.explained_variance_ratio[0] * 100.0,
        result.explained_variance_ratio[1] * 100.0
    );
    print_warnings(&output.diagnostics);
    Ok(())
}

fn cmd_summary(config: &Config, mut diagnostics: Diagnostics, output: Option<&Path>) -> Result<()> {
    let dataset = Dataset::load(config, &mut diagnostics)?;
    let summary = StudySummary::from_dataset(&dataset, config, &mut diagnostics)?;
    print!("{}", summary);

    if let Some(path) = output {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &summary)?;
        eprintln!("Wrote {:?}", path);
    }
    print_warnings(&diagnostics);
    Ok(())
}

fn cmd_example_config() -> Result<()> {
    print!("{}", Config::default().to_yaml()?);
    Ok(())
}

fn cmd_clear_cache(cache_dir: Option<&Path>) -> Result<()> {
    let cache = match cache_dir {
        Some(dir) => ResultCache::new(dir),
        None => ResultCache::default_location(),
    };
    cache.clear()?;
    eprintln!("Cleared {:?}", cache.dir());
    Ok(())
}
