use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use itertools::Itertools;
use log::info;

use vcf_engine::{Engine, Extract, Filter, OutputMode, Region, VarType, VariantKey};

/// Filter a VCF and print genotype tables.
#[derive(Parser, Debug)]
#[command(name = "vcf-engine", version)]
struct Args {
    /// bgzip-compressed VCF with a .tbi/.csi index (any VCF with --no-index)
    path: PathBuf,

    /// Read the whole file into memory instead of using its index
    #[arg(long)]
    no_index: bool,

    /// Region as chrom, chrom:pos or chrom:start-end (1-based, inclusive)
    #[arg(short, long)]
    region: Option<Region>,

    /// Samples to keep, in output column order
    #[arg(short, long, value_delimiter = ',')]
    samples: Option<Vec<String>>,

    /// Drop records and prune genotypes carrying any of these FILTER/FT tags
    #[arg(long = "exclude-filters", value_delimiter = ',')]
    filter_tags: Option<Vec<String>>,

    /// Keep only these variant types (snp, indel, sv)
    #[arg(long, value_delimiter = ',')]
    vartypes: Option<Vec<VarType>>,

    /// Keep records with at most this many ALT alleles
    #[arg(long)]
    max_alleles: Option<usize>,

    /// Table to print: raw (allele counts per sample) or summary
    #[arg(short, long, default_value = "raw")]
    mode: OutputMode,

    /// Print the samples carrying an allele, given as chrom-pos-ref-alt
    #[arg(long)]
    who_has: Option<VariantKey>,

    /// Print JSON instead of tab separated text
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn filter(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(region) = &self.region {
            filter = filter.region(region.clone());
        }
        if let Some(samples) = &self.samples {
            filter = filter.samples(samples.iter().cloned());
        }
        if let Some(tags) = &self.filter_tags {
            filter = filter.filter_tags(tags.iter().cloned());
        }
        if let Some(types) = &self.vartypes {
            filter = filter.vartypes(types.iter().copied());
        }
        if let Some(n) = self.max_alleles {
            filter = filter.max_alleles(n);
        }
        filter
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let engine = if args.no_index {
        Engine::from_path_unindexed(&args.path)
    } else {
        Engine::open(&args.path, None)
    }
    .with_context(|| format!("failed to open {}", args.path.display()))?;

    let engine = engine.filter(&args.filter()).context("failed to apply filters")?;
    info!(
        "filters: [{}]",
        engine.filter_stack().iter().join(", ")
    );

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if let Some(key) = &args.who_has {
        let carriers = engine.who_has(key.chrom(), key.pos(), key.ref_allele(), key.alt())?;
        if args.json {
            serde_json::to_writer_pretty(&mut out, &carriers)?;
            writeln!(out)?;
        } else {
            for sample in &carriers.samples {
                writeln!(out, "{}", sample)?;
            }
        }
        return Ok(out.flush()?);
    }

    let table = engine.extract(args.mode)?;
    if args.json {
        serde_json::to_writer_pretty(&mut out, &table)?;
        writeln!(out)?;
        return Ok(out.flush()?);
    }
    match table {
        Extract::Raw(matrix) => {
            writeln!(out, "id\t{}", engine.samples().iter().join("\t"))?;
            for (id, row) in &matrix {
                let counts = engine
                    .samples()
                    .iter()
                    .map(|s| row.get(s).map_or(".".to_string(), |c| c.to_string()))
                    .join("\t");
                writeln!(out, "{}\t{}", id, counts)?;
            }
        }
        Extract::Summary(summary) => {
            writeln!(out, "id\tRR\tRA\tAA\tR\tA\tO")?;
            for (id, s) in &summary {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    id, s.rr, s.ra, s.aa, s.r, s.a, s.o
                )?;
            }
        }
    }
    Ok(out.flush()?)
}
