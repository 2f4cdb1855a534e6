//! Emberline CLI - burn-severity mapping from Sentinel-2 imagery

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use emberline_algorithms::imagery::{classify, compute_delta, compute_index, Snapshot};
use emberline_algorithms::masking::CloudMask;
use emberline_algorithms::resample::{align, Resampling};
use emberline_algorithms::statistics::{pixel_ground_area_km2, summarize, SeveritySummary};
use emberline_cloud::{
    export_candidates, select_scene, CatalogConnector, HttpBandReader, SearchRequest,
    StacCatalog, StacCatalogConnector,
};
use emberline_colormap::{
    auto_params, ColorScheme, Colormap, ColormapParams, OverlayRenderer, RgbaOverlayRenderer,
};
use emberline_core::io::{read_geotiff, write_geotiff, write_geotiff_u8};
use emberline_core::{AreaOfInterest, Envelope, Raster, RasterElement};
use emberline_pipeline::{
    write_products, BurnSeverityPipeline, DateWindow, PipelineConfig, SeverityRequest,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "emberline")]
#[command(author, version, about = "Burn-severity mapping from satellite imagery", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (TOML). Defaults to $EMBERLINE_CONFIG
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Area of interest: a bounding box or a GeoJSON polygon file
#[derive(Args)]
struct AoiArgs {
    /// MIN_LON,MIN_LAT,MAX_LON,MAX_LAT
    #[arg(long, value_delimiter = ',', num_args = 4, allow_hyphen_values = true,
          conflicts_with = "geojson", required_unless_present = "geojson")]
    bbox: Option<Vec<f64>>,
    /// GeoJSON file with a Polygon, Feature or FeatureCollection
    #[arg(long)]
    geojson: Option<PathBuf>,
}

/// Catalog overrides
#[derive(Args)]
struct CatalogArgs {
    /// Catalog: pc, es, or a STAC API URL
    #[arg(long)]
    catalog: Option<String>,
    /// Maximum scene cloud cover in percent
    #[arg(long)]
    max_cloud: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Search the catalog and report the scene that would be selected
    Search {
        #[command(flatten)]
        aoi: AoiArgs,
        #[command(flatten)]
        catalog: CatalogArgs,
        /// Date window START/END (YYYY-MM-DD/YYYY-MM-DD)
        #[arg(long)]
        window: DateWindow,
        /// Write all candidates to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Full pipeline: search, download, NBR, dNBR, severity and statistics
    Run {
        #[command(flatten)]
        aoi: AoiArgs,
        #[command(flatten)]
        catalog: CatalogArgs,
        /// Pre-fire date window START/END
        #[arg(long)]
        pre: DateWindow,
        /// Post-fire date window START/END
        #[arg(long)]
        post: DateWindow,
        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
        /// Download directory for band assets
        #[arg(long, default_value = "downloads")]
        work_dir: PathBuf,
        /// Keep downloaded band files
        #[arg(long)]
        keep_downloads: bool,
        /// Skip the scene-classification cloud mask
        #[arg(long)]
        no_mask: bool,
        /// Skip the overlay image
        #[arg(long)]
        no_overlay: bool,
        /// Replace a non-empty output directory
        #[arg(long)]
        overwrite: bool,
    },
    /// Normalized Burn Ratio from local NIR and SWIR GeoTIFFs
    Nbr {
        /// NIR band (e.g. B08)
        #[arg(long)]
        nir: PathBuf,
        /// SWIR band (e.g. B12)
        #[arg(long)]
        swir: PathBuf,
        /// Scene classification (SCL) used for cloud masking
        #[arg(long)]
        scl: Option<PathBuf>,
        /// Output file
        output: PathBuf,
    },
    /// Differenced NBR (pre minus post)
    Dnbr {
        /// Pre-fire NBR raster
        pre: PathBuf,
        /// Post-fire NBR raster
        post: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// Classify a dNBR raster into severity classes
    Classify {
        /// Input dNBR raster
        input: PathBuf,
        /// Output file (8-bit class codes, 255 = no data)
        output: PathBuf,
    },
    /// Per-class statistics of a severity raster
    Stats {
        /// Severity raster
        input: PathBuf,
        /// dNBR raster for mean/min/max
        #[arg(long)]
        dnbr: Option<PathBuf>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Render a raster as an RGBA map overlay
    Overlay {
        /// Input raster (index, dNBR, or severity classes)
        input: PathBuf,
        /// Output TIFF (a .json sidecar is written next to it)
        output: PathBuf,
        /// Geographic bounds MIN_LON,MIN_LAT,MAX_LON,MAX_LAT [default: the raster's extent]
        #[arg(long, value_delimiter = ',', num_args = 4, allow_hyphen_values = true)]
        bounds: Option<Vec<f64>>,
        /// Render as severity classes
        #[arg(long)]
        classes: bool,
        /// Color scheme for continuous rasters: dnbr, nbr, grayscale
        #[arg(long, default_value = "dnbr")]
        scheme: ColorScheme,
        /// Stretch colors to the data range instead of the scheme range
        #[arg(long)]
        stretch: bool,
        /// Layer opacity 0..1
        #[arg(long, default_value = "0.65")]
        opacity: f64,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn load_config(path: Option<&Path>, catalog: Option<&CatalogArgs>) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(p) => PipelineConfig::load(p).with_context(|| format!("Failed to load {}", p.display()))?,
        None => PipelineConfig::from_env().context("Failed to load configuration")?,
    };
    if let Some(args) = catalog {
        if let Some(c) = &args.catalog {
            config.catalog.catalog = StacCatalog::from_str_or_url(c);
        }
        if let Some(cc) = args.max_cloud {
            config.catalog.max_cloud_cover = cc;
        }
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn read_aoi(args: &AoiArgs) -> Result<AreaOfInterest> {
    if let Some(path) = &args.geojson {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        return AreaOfInterest::from_geojson_str(&text).context("Invalid AOI geometry");
    }
    match args.bbox.as_deref() {
        Some(&[min_lon, min_lat, max_lon, max_lat]) => {
            AreaOfInterest::from_bounding_box(min_lon, min_lat, max_lon, max_lat)
                .context("Invalid AOI bounding box")
        }
        _ => anyhow::bail!("Provide --bbox MIN_LON,MIN_LAT,MAX_LON,MAX_LAT or --geojson FILE"),
    }
}

fn connector(config: &PipelineConfig) -> Result<StacCatalogConnector> {
    let c = &config.catalog;
    Ok(StacCatalogConnector::new(c.catalog.clone(), c.client_options())
        .context("Failed to create catalog client")?
        .with_collection(c.collection.clone())
        .with_band_keys(config.bands.clone())
        .with_page_limit(c.page_limit))
}

fn read_band(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> =
        read_geotiff(path).with_context(|| format!("Failed to read {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn read_classes(path: &Path) -> Result<Raster<u8>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<u8> =
        read_geotiff(path).with_context(|| format!("Failed to read {}", path.display()))?;
    pb.finish_and_clear();
    Ok(raster)
}

fn write_result(raster: &Raster<f64>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path, None).context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn extent_or<T: RasterElement>(bounds: Option<Envelope>, raster: &Raster<T>) -> Result<Envelope> {
    match bounds {
        Some(b) => Ok(b),
        None => Envelope::of_raster(raster).context("Cannot place raster on a map; pass --bounds"),
    }
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn print_summary(summary: &SeveritySummary) {
    println!(
        "\nValid pixels: {} ({} no-data), {:.4} km² per pixel",
        summary.total_valid_pixels, summary.nodata_pixels, summary.pixel_area_km2
    );
    println!("{:<20} {:>10} {:>12} {:>8}", "Class", "Pixels", "Area km²", "%");
    for c in &summary.classes {
        println!(
            "{:<20} {:>10} {:>12.4} {:>7.2}%",
            c.label, c.pixel_count, c.area_km2, c.percent
        );
    }
    println!(
        "\nTotal area:    {:.4} km²\nBurned area:   {:.4} km² ({:.2}%)\nHigh severity: {:.4} km² ({:.2}%)",
        summary.total_area_km2,
        summary.burned_area_km2,
        summary.burned_percent,
        summary.high_severity_area_km2,
        summary.high_severity_percent
    );
    if let Some(d) = &summary.dnbr {
        println!("dNBR: mean {:.4}, min {:.4}, max {:.4}", d.mean, d.min, d.max);
    }
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    let config_path = cli.config.as_deref();

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let raster = read_band(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let (Some(min), Some(max), Some(mean)) = (stats.min, stats.max, stats.mean) {
                println!("  Min: {:.4}\n  Max: {:.4}\n  Mean: {:.4}", min, max, mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
            );
        }

        // ── Search ───────────────────────────────────────────────────
        Commands::Search {
            aoi,
            catalog,
            window,
            output,
        } => {
            let config = load_config(config_path, Some(&catalog))?;
            let aoi = read_aoi(&aoi)?;
            let ceiling = config.catalog.max_cloud_cover;
            let request = SearchRequest::new(aoi, window.start, window.end, ceiling);

            let pb = spinner("Searching catalog...");
            let candidates = connector(&config)?
                .search(&request)
                .context("Catalog search failed")?;
            pb.finish_and_clear();

            println!("{} scene(s) in {}:", candidates.len(), window);
            for c in &candidates {
                println!("  {}  {}  {:>5.1}%", c.acquired.format("%Y-%m-%d %H:%M"), c.id, c.cloud_cover);
            }
            match select_scene(&candidates, ceiling) {
                Ok(best) => println!("\nSelected: {} ({:.1}% cloud)", best.id, best.cloud_cover),
                Err(e) => println!("\n{}", e),
            }
            if let Some(path) = output {
                export_candidates(&path, &candidates).context("Failed to export candidates")?;
                println!("Candidates saved to: {}", path.display());
            }
        }

        // ── Run ──────────────────────────────────────────────────────
        Commands::Run {
            aoi,
            catalog,
            pre,
            post,
            output,
            work_dir,
            keep_downloads,
            no_mask,
            no_overlay,
            overwrite,
        } => {
            let mut config = load_config(config_path, Some(&catalog))?;
            if no_mask {
                config.cloud_mask.enabled = false;
            }
            if no_overlay {
                config.output.write_overlay = false;
            }
            config.output.overwrite |= overwrite;

            let aoi = read_aoi(&aoi)?;
            let reader = HttpBandReader::new(
                config.catalog.catalog.clone(),
                config.catalog.client_options(),
                work_dir,
            )
            .context("Failed to prepare download directory")?
            .keep_downloads(keep_downloads);
            let pipeline = BurnSeverityPipeline::new(connector(&config)?, reader, config)
                .context("Invalid configuration")?;

            let start = Instant::now();
            let pb = spinner("Running burn-severity pipeline...");
            let result = pipeline.run(&SeverityRequest::new(aoi, pre, post));
            pb.finish_and_clear();
            let products = result.context("Pipeline failed")?;

            let written = write_products(&products, &output, &pipeline.config().output)
                .context("Failed to write products")?;
            let elapsed = start.elapsed();

            println!("Pre-fire scene:  {} ({:.1}% cloud)", products.pre_scene.id, products.pre_scene.cloud_cover);
            println!("Post-fire scene: {} ({:.1}% cloud)", products.post_scene.id, products.post_scene.cloud_cover);
            print_summary(&products.summary);
            done("Products", &written.dir, elapsed);
        }

        // ── Single stages ────────────────────────────────────────────
        Commands::Nbr {
            nir,
            swir,
            scl,
            output,
        } => {
            let config = load_config(config_path, None)?;
            let nir = read_band(&nir)?;
            let swir = read_band(&swir)?;
            let start = Instant::now();
            let (mut nir, mut swir) =
                align(&nir, &swir, Resampling::Bilinear).context("Failed to align bands")?;
            if let Some(path) = scl {
                let classes = read_band(&path)?;
                let mask = config.cloud_mask.mask().unwrap_or_else(CloudMask::default);
                let (n, s) = mask
                    .mask_pair(&nir, &swir, &classes)
                    .context("Failed to apply cloud mask")?;
                info!("Masked {} cells", n.masked.max(s.masked));
                nir = n.raster;
                swir = s.raster;
            }
            let nbr = compute_index(&nir, &swir, Snapshot::Pre, &config.index)
                .context("Failed to compute NBR")?;
            let elapsed = start.elapsed();
            write_result(nbr.raster(), &output)?;
            done("NBR", &output, elapsed);
        }

        Commands::Dnbr { pre, post, output } => {
            let pre = read_band(&pre)?;
            let post = read_band(&post)?;
            let start = Instant::now();
            let result = compute_delta(&pre, &post).context("Failed to compute dNBR")?;
            let elapsed = start.elapsed();
            write_result(&result, &output)?;
            done("dNBR", &output, elapsed);
        }

        Commands::Classify { input, output } => {
            let config = load_config(config_path, None)?;
            let dnbr = read_band(&input)?;
            let start = Instant::now();
            let result = classify(&dnbr, &config.thresholds).context("Failed to classify")?;
            let elapsed = start.elapsed();
            write_geotiff_u8(&result, &output).context("Failed to write output")?;
            done("Severity", &output, elapsed);
        }

        Commands::Stats { input, dnbr, json } => {
            let severity = read_classes(&input)?;
            let area = pixel_ground_area_km2(&severity).context("Cannot derive pixel area")?;
            let mut summary = summarize(&severity, area).context("Failed to summarize")?;
            if let Some(path) = dnbr {
                summary = summary.with_delta(&read_band(&path)?);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }

        Commands::Overlay {
            input,
            output,
            bounds,
            classes,
            scheme,
            stretch,
            opacity,
        } => {
            let bounds = match bounds.as_deref() {
                Some(&[min_lon, min_lat, max_lon, max_lat]) => {
                    Some(AreaOfInterest::from_bounding_box(min_lon, min_lat, max_lon, max_lat)
                        .context("Invalid bounds")?
                        .envelope())
                }
                Some(_) => anyhow::bail!("--bounds takes MIN_LON,MIN_LAT,MAX_LON,MAX_LAT"),
                None => None,
            };
            let renderer = RgbaOverlayRenderer::new(opacity)
                .context("Invalid opacity")?
                .with_name(input.file_stem().and_then(|s| s.to_str()).unwrap_or("overlay"));

            let start = Instant::now();
            let image = if classes {
                let raster = read_classes(&input)?;
                let bounds = extent_or(bounds, &raster)?;
                renderer.render(&raster, bounds, &Colormap::burn_severity())
            } else {
                let raster = read_band(&input)?;
                let bounds = extent_or(bounds, &raster)?;
                let colormap = if stretch {
                    Colormap::Continuous(auto_params(&raster, scheme))
                } else {
                    Colormap::Continuous(ColormapParams::new(scheme))
                };
                renderer.render(&raster, bounds, &colormap)
            }
            .context("Failed to render overlay")?;
            image.write(&output).context("Failed to write overlay")?;
            done("Overlay", &output, start.elapsed());
        }
    }

    Ok(())
}
