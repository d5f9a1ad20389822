use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use lensfix::core::quantize_slider;
use lensfix::imaging::{is_image_path, PatternSize};
use lensfix::prelude::*;

/// Lens distortion toolbox: synthetic distortion, chessboard calibration and
/// batch correction.
#[derive(Debug, Parser)]
#[command(name = "lensfix", author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render an image as seen through a lens with the given coefficients.
    Apply(DistortArgs),
    /// Remove distortion with the given coefficients.
    Correct(DistortArgs),
    /// Estimate camera matrix and distortion from chessboard photos.
    Calibrate(CalibrateArgs),
    /// Undistort every image in a directory with a saved calibration.
    Batch(BatchArgs),
    /// Resize an image keeping its aspect ratio.
    Resize(ResizeArgs),
}

#[derive(Debug, Args)]
struct DistortArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
    /// Radial k1 in [-1, 1], snapped to 0.01.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true, value_parser = parse_coeff)]
    k1: f64,
    /// Radial k2 in [-1, 1], snapped to 0.01.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true, value_parser = parse_coeff)]
    k2: f64,
    /// Tangential p1 in [-1, 1], snapped to 0.01.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true, value_parser = parse_coeff)]
    p1: f64,
    /// Tangential p2 in [-1, 1], snapped to 0.01.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true, value_parser = parse_coeff)]
    p2: f64,
}

#[derive(Debug, Args)]
struct CalibrateArgs {
    /// Calibration image; repeat for several.
    #[arg(long = "image")]
    images: Vec<PathBuf>,
    /// Directory whose images are added to the calibration set.
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Inner corners as COLSxROWS, e.g. 9x6.
    #[arg(long)]
    pattern: Option<PatternSize>,
    /// Edge length of one board square.
    #[arg(long)]
    square_size: Option<f64>,
    /// Detect on plain grayscale without HSV segmentation.
    #[arg(long)]
    no_color_mask: bool,
    /// JSON calibration config; command-line flags override it.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Where to write the calibration result (JSON).
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct BatchArgs {
    /// Calibration result written by `calibrate`.
    #[arg(long)]
    calibration: PathBuf,
    #[arg(long)]
    dir: PathBuf,
    /// Output directory; defaults to the input directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ResizeArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
    /// Target width; takes precedence over --height.
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
}

fn parse_coeff(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("'{s}' is not a number: {e}"))?;
    quantize_slider(value).map_err(|e| e.to_string())
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

fn run_distort(args: &DistortArgs, apply: bool) -> Result<()> {
    let img = load_image(&args.input)?;
    let out = if apply {
        apply_distortion(&img, args.k1, args.k2, args.p1, args.p2)?
    } else {
        correct_distortion(&img, args.k1, args.k2, args.p1, args.p2)?
    };
    save_image(&out, &args.output)?;
    tracing::info!(
        "{} k1={:.2} k2={:.2} p1={:.2} p2={:.2}: {} -> {}",
        if apply { "applied" } else { "corrected" },
        args.k1,
        args.k2,
        args.p1,
        args.p2,
        args.input.display(),
        args.output.display()
    );
    Ok(())
}

fn calibration_inputs(args: &CalibrateArgs) -> Result<Vec<PathBuf>> {
    let mut paths = args.images.clone();
    if let Some(dir) = &args.dir {
        let mut found: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("failed to list {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && is_image_path(p))
            .collect();
        found.sort();
        paths.extend(found);
    }
    if paths.is_empty() {
        bail!("no calibration images given (use --image or --dir)");
    }
    Ok(paths)
}

fn calibrate_config(args: &CalibrateArgs) -> Result<CalibrateConfig> {
    let mut config = match &args.config {
        Some(path) => load_json_file::<CalibrateConfig>(path)?,
        None => CalibrateConfig::default(),
    };
    if let Some(pattern) = args.pattern {
        config.pattern_size = pattern;
    }
    if let Some(square) = args.square_size {
        config.square_size = square;
    }
    if args.no_color_mask {
        config.color_mask = None;
    }
    if let Err(err) = config.validate() {
        match &args.config {
            Some(path) => bail!("{}: {err}", path.display()),
            None => bail!("{err}"),
        }
    }
    Ok(config)
}

fn run_calibrate(args: &CalibrateArgs) -> Result<CalibrationResult> {
    let paths = calibration_inputs(args)?;
    let config = calibrate_config(args)?;
    tracing::info!(
        "calibrating from {} images, pattern {}",
        paths.len(),
        config.pattern_size
    );

    let mut bench = Workbench::new(config);
    let result = bench.calibrate(&paths)?.clone();
    result.save_json(&args.out)?;

    for skipped in &result.skipped {
        tracing::warn!("skipped {}", skipped.display());
    }
    tracing::info!(
        "{} views, rms {:.4} px, mean {:.4} px -> {}",
        result.views_used,
        result.rms_error,
        result.mean_error,
        args.out.display()
    );
    Ok(result)
}

fn run_batch(args: &BatchArgs) -> Result<BatchReport> {
    let calibration: CalibrationResult = load_json_file(&args.calibration)?;
    let mut bench = Workbench::default();
    if let Err(err) = bench.load_calibration(calibration) {
        tracing::warn!("{}: {err}", args.calibration.display());
        return Err(err.into());
    }

    let opts = BatchOptions {
        out_dir: args.out_dir.clone(),
    };
    let report = bench.batch_correct(&args.dir, &opts)?;
    for path in &report.unreadable {
        tracing::warn!("could not read {}", path.display());
    }
    tracing::info!(
        "corrected {} images ({} unreadable, {} failed)",
        report.written.len(),
        report.unreadable.len(),
        report.failed.len()
    );
    Ok(report)
}

fn run_resize(args: &ResizeArgs) -> Result<()> {
    let img = load_image(&args.input)?;
    let out = resize_image(&img, args.width, args.height);
    save_image(&out, &args.output)?;
    tracing::info!(
        "{}x{} -> {}x{}: {}",
        img.width(),
        img.height(),
        out.width(),
        out.height(),
        args.output.display()
    );
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Apply(args) => run_distort(args, true),
        Commands::Correct(args) => run_distort(args, false),
        Commands::Calibrate(args) => run_calibrate(args).map(drop),
        Commands::Batch(args) => run_batch(args).map(drop),
        Commands::Resize(args) => run_resize(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use image::{DynamicImage, GrayImage, Luma};

    fn write_board(path: &Path) {
        let img = GrayImage::from_fn(80, 60, |x, y| {
            Luma([if (x / 10 + y / 10) % 2 == 0 { 30 } else { 220 }])
        });
        save_image(&DynamicImage::ImageLuma8(img), path).unwrap();
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn coefficients_are_validated_and_snapped() {
        assert_eq!(parse_coeff("0.123").unwrap(), 0.12);
        assert_eq!(parse_coeff("-1").unwrap(), -1.0);
        assert!(parse_coeff("1.5").is_err());
        assert!(parse_coeff("abc").is_err());
        assert!(parse_coeff("NaN").is_err());
    }

    #[test]
    fn negative_coefficients_parse_as_values() {
        let cli = Cli::try_parse_from([
            "lensfix", "apply", "--input", "a.png", "--output", "b.png", "--k1", "-0.25", "--p2",
            "0.01",
        ])
        .unwrap();
        let Commands::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.k1, -0.25);
        assert_eq!(args.k2, 0.0);
        assert_eq!(args.p2, 0.01);
    }

    #[test]
    fn calibrate_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_path = dir.path().join("cfg.json");
        fs::write(&cfg_path, r#"{"square_size": 0.5, "pattern_size": {"cols": 4, "rows": 3}}"#).unwrap();

        let cli = Cli::try_parse_from([
            "lensfix",
            "calibrate",
            "--image",
            "a.png",
            "--image",
            "b.png",
            "--pattern",
            "7x5",
            "--no-color-mask",
            "--config",
            cfg_path.to_str().unwrap(),
            "--out",
            "r.json",
        ])
        .unwrap();
        let Commands::Calibrate(args) = cli.command else {
            panic!("expected calibrate");
        };
        assert_eq!(args.images.len(), 2);

        let config = calibrate_config(&args).unwrap();
        assert_eq!(config.pattern_size, PatternSize { cols: 7, rows: 5 });
        assert_eq!(config.square_size, 0.5);
        assert_eq!(config.color_mask, None);
    }

    #[test]
    fn config_file_square_size_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_path = dir.path().join("cfg.json");
        fs::write(&cfg_path, r#"{"square_size": 0}"#).unwrap();
        let parse = |extra: &[&str]| {
            let mut argv = vec![
                "lensfix",
                "calibrate",
                "--image",
                "a.png",
                "--config",
                cfg_path.to_str().unwrap(),
                "--out",
                "r.json",
            ];
            argv.extend_from_slice(extra);
            let Commands::Calibrate(args) = Cli::try_parse_from(argv).unwrap().command else {
                panic!("expected calibrate");
            };
            args
        };

        let err = calibrate_config(&parse(&[])).unwrap_err().to_string();
        assert!(err.contains("square_size"), "{err}");
        assert!(err.contains("cfg.json"), "{err}");

        let config = calibrate_config(&parse(&["--square-size", "0.02"])).unwrap();
        assert_eq!(config.square_size, 0.02);
        assert!(calibrate_config(&parse(&["--square-size=-1"])).is_err());
    }

    #[test]
    fn calibrate_without_inputs_is_an_error() {
        let cli = Cli::try_parse_from(["lensfix", "calibrate", "--out", "r.json"]).unwrap();
        let Commands::Calibrate(args) = cli.command else {
            panic!("expected calibrate");
        };
        assert!(run_calibrate(&args).is_err());
    }

    #[test]
    fn apply_correct_and_resize_write_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        write_board(&input);

        let distorted = dir.path().join("distorted.png");
        let apply = DistortArgs {
            input: input.clone(),
            output: distorted.clone(),
            k1: -0.2,
            k2: 0.0,
            p1: 0.0,
            p2: 0.0,
        };
        run_distort(&apply, true).unwrap();

        let restored = dir.path().join("restored.jpg");
        let correct = DistortArgs {
            input: distorted,
            output: restored.clone(),
            ..apply
        };
        run_distort(&correct, false).unwrap();
        assert_eq!(load_image(&restored).unwrap().width(), 80);

        let small = dir.path().join("small.bmp");
        run_resize(&ResizeArgs {
            input,
            output: small.clone(),
            width: None,
            height: Some(30),
        })
        .unwrap();
        let img = load_image(&small).unwrap();
        assert_eq!((img.width(), img.height()), (40, 30));
    }

    #[test]
    fn batch_uses_saved_calibration_and_refuses_invalid_ones() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("shots");
        fs::create_dir(&images).unwrap();
        write_board(&images.join("a.png"));
        write_board(&images.join("b.png"));
        fs::write(images.join("readme.txt"), "x").unwrap();

        let calibration = CalibrationResult {
            camera_matrix: [[80.0, 0.0, 40.0], [0.0, 80.0, 30.0], [0.0, 0.0, 1.0]],
            dist_coeffs: DistortionCoeffs::full(-0.1, 0.0, 0.0, 0.0, 0.0),
            image_size: (80, 60),
            rms_error: 0.2,
            mean_error: 0.2,
            views_used: 3,
            per_view_errors: vec![0.2; 3],
            skipped: Vec::new(),
        };
        let calib_path = dir.path().join("calib.json");
        calibration.save_json(&calib_path).unwrap();

        let args = BatchArgs {
            calibration: calib_path.clone(),
            dir: images.clone(),
            out_dir: None,
        };
        let report = run_batch(&args).unwrap();
        assert_eq!(report.written.len(), 2);
        assert!(images.join("corrected_a.png").exists());

        let mut broken = calibration;
        broken.camera_matrix[0][0] = -1.0;
        broken.save_json(&calib_path).unwrap();
        assert!(run_batch(&args).is_err());
    }
}
