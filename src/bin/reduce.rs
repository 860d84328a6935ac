use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use color_reducer::{
    DEFAULT_COLORS, KmeansOptions, PageSize, Session, SessionConfig, parse_hex,
};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Reduce images to a small palette, optionally recolor, and export PNG/PDF.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// One or more input image paths
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Number of palette colors (2-32)
    #[arg(short = 'k', long, default_value_t = DEFAULT_COLORS)]
    n_colors: usize,

    /// Replace a palette entry's color: CLUSTER=#rrggbb (repeatable)
    #[arg(long = "override", value_name = "ID=HEX")]
    overrides: Vec<String>,

    /// Recolor pixels near a color: TARGET:REPLACEMENT[:TOLERANCE] (repeatable, applied in order)
    #[arg(long = "substitute", value_name = "T:R[:TOL]")]
    substitutions: Vec<String>,

    /// Also write a PDF with the palette legend
    #[arg(long)]
    pdf: bool,

    /// PDF page size (A0-A4)
    #[arg(long, default_value = "A4")]
    page_size: PageSize,

    /// Print palette and distribution as JSON
    #[arg(long)]
    json: bool,

    /// k-means RNG seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// k-means iteration cap
    #[arg(long, default_value_t = 100)]
    max_iter: usize,

    /// Output directory
    #[arg(short = 'd', long)]
    out_dir: Option<PathBuf>,

    /// Output filename prefix (ignored when --out-dir supplied)
    #[arg(short = 'p', long, default_value = "reduced_")]
    prefix: String,
}

fn parse_override(value: &str) -> Result<(usize, String)> {
    let (id, hex) = value
        .split_once('=')
        .ok_or_else(|| anyhow!("override {value:?} must look like ID=#rrggbb"))?;
    let id = id.trim().parse().with_context(|| format!("bad cluster id in {value:?}"))?;
    Ok((id, hex.trim().to_string()))
}

fn parse_substitution(value: &str) -> Result<(String, String, Option<f64>)> {
    let parts: Vec<&str> = value.split(':').map(str::trim).collect();
    match parts.as_slice() {
        [target, replacement] => Ok((target.to_string(), replacement.to_string(), None)),
        [target, replacement, tol] => {
            let tol = tol.parse().with_context(|| format!("bad tolerance in {value:?}"))?;
            Ok((target.to_string(), replacement.to_string(), Some(tol)))
        }
        _ => bail!("substitution {value:?} must look like TARGET:REPLACEMENT[:TOLERANCE]"),
    }
}

fn output_path(args: &Args, input: &Path, ext: &str) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    match &args.out_dir {
        Some(dir) => dir.join(format!("{stem}.{ext}")),
        None => PathBuf::from(format!("{}{stem}.{ext}", args.prefix)),
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
    println!("Saved → {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let args = Args::parse();

    let overrides = args
        .overrides
        .iter()
        .map(|s| parse_override(s))
        .collect::<Result<Vec<_>>>()?;
    let substitutions = args
        .substitutions
        .iter()
        .map(|s| parse_substitution(s))
        .collect::<Result<Vec<_>>>()?;
    // Fail on malformed colors before doing any work.
    for (_, hex) in &overrides {
        parse_hex(hex)?;
    }

    let config = SessionConfig {
        kmeans: KmeansOptions {
            seed: args.seed,
            max_iter: args.max_iter,
            ..KmeansOptions::default()
        },
        ..SessionConfig::default()
    };

    for input in &args.inputs {
        let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
        let mut session = Session::with_config(config.clone());
        session.load_bytes(&bytes).context("decoding image failed")?;
        session.quantize(args.n_colors).context("quantization failed")?;

        for (id, hex) in &overrides {
            session.set_override_hex(*id, hex)?;
        }
        for (target, replacement, tol) in &substitutions {
            session.substitute_hex(target, replacement, *tol)?;
        }

        write_output(&output_path(&args, input, "png"), &session.encode_png()?)?;
        if args.pdf {
            let pdf = session
                .render_document(args.page_size)
                .context("rendering PDF failed")?;
            write_output(&output_path(&args, input, "pdf"), &pdf)?;
        }

        if args.json {
            let distribution: Vec<_> = session
                .distribution()?
                .iter()
                .map(|e| json!({ "color": e.hex(), "percentage": e.percentage }))
                .collect();
            let report = json!({
                "input": input.display().to_string(),
                "palette": session.palette_hex()?,
                "distribution": distribution,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_override() {
        let (id, hex) = parse_override("3=#00ff00").unwrap();
        assert_eq!(id, 3);
        assert_eq!(hex, "#00ff00");

        let (id, hex) = parse_override(" 0 = ff0000 ").unwrap();
        assert_eq!((id, hex.as_str()), (0, "ff0000"));
    }

    #[test]
    fn test_parse_override_requires_equals() {
        assert!(parse_override("3#00ff00").is_err());
        assert!(parse_override("x=#00ff00").is_err());
    }

    #[test]
    fn test_parse_substitution_without_tolerance() {
        let (target, replacement, tol) = parse_substitution("#ff0000:#0000ff").unwrap();
        assert_eq!(target, "#ff0000");
        assert_eq!(replacement, "#0000ff");
        assert_eq!(tol, None);
    }

    #[test]
    fn test_parse_substitution_with_tolerance() {
        let (target, replacement, tol) = parse_substitution("ff0000:0000ff:35.5").unwrap();
        assert_eq!((target.as_str(), replacement.as_str()), ("ff0000", "0000ff"));
        assert_eq!(tol, Some(35.5));
    }

    #[test]
    fn test_parse_substitution_rejects_bad_input() {
        assert!(parse_substitution("#ff0000:#0000ff:wide").is_err());
        assert!(parse_substitution("#ff0000").is_err());
        assert!(parse_substitution("a:b:1:2").is_err());
    }
}
