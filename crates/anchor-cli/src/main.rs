use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use tracing::{info, warn};

use anchor_data::params::AnchorCfg;
use anchor_data::{anchor_params, doctor as data_doctor, filter_bucket, load_boxes, LoadOptions, SizeBucket};
use anchor_kmeans::{average_best_iou, BoxShape, Clustering, EmptyClusterPolicy, KMeans, KMeansConfig, Mean};
use anchor_proto::report::{AnchorEntry, ClusterReport, ScoreReport, SweepPoint};

#[derive(Debug, Parser)]
#[command(name = "anchors", version, about = "anchorfit - anchor box shapes from IoU k-means")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the config and check that the dataset loads.
    Doctor,
    /// Cluster the dataset and print the resulting anchors.
    Cluster {
        #[arg(long)]
        k: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        json: bool,
    },
    /// Score the anchors listed under [score] against the dataset.
    Score {
        #[arg(long)]
        json: bool,
    },
    /// Average IoU for every k in from..=to.
    Sweep {
        #[arg(long, default_value_t = 1)]
        from: usize,
        #[arg(long, default_value_t = 12)]
        to: usize,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    dataset: DatasetCfg,
    kmeans: KmeansCfg,
    #[serde(default)]
    anchors: AnchorCfg,
    score: Option<ScoreCfg>,
}

#[derive(Debug, serde::Deserialize)]
struct DatasetCfg {
    path: String,
    #[serde(default = "default_bucket")]
    bucket: String, // all | small | medium | large
    resize_to: Option<u32>,
    #[serde(default = "default_true")]
    skip_crowd: bool,
}

#[derive(Debug, serde::Deserialize)]
struct KmeansCfg {
    k: usize,
    seed: Option<u64>,
    #[serde(default = "default_aggregator")]
    aggregator: String, // median | mean
    #[serde(default = "default_empty_cluster")]
    empty_cluster: String, // freeze | reseed | fail
    #[serde(default = "default_max_iterations")]
    max_iterations: usize,
}

#[derive(Debug, serde::Deserialize)]
struct ScoreCfg {
    anchors: Vec<[f64; 2]>,
}

fn default_bucket() -> String { "all".into() }
fn default_true() -> bool { true }
fn default_aggregator() -> String { "median".into() }
fn default_empty_cluster() -> String { "freeze".into() }
fn default_max_iterations() -> usize { anchor_kmeans::kmeans::DEFAULT_MAX_ITERATIONS }

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    toml::from_str(&s).context("parse config toml")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Cluster { k, seed, json } => cluster(&cfg, k, seed, json)?,
        Command::Score { json } => score(&cfg, json)?,
        Command::Sweep { from, to, seed, json } => sweep(&cfg, from, to, seed, json)?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    parse_empty_cluster(&cfg.kmeans.empty_cluster)?;
    anyhow::ensure!(
        matches!(cfg.kmeans.aggregator.as_str(), "median" | "mean"),
        "unknown kmeans.aggregator: {}",
        cfg.kmeans.aggregator
    );
    data_doctor::check_kmeans(cfg.kmeans.k, cfg.kmeans.max_iterations)?;
    data_doctor::check_dataset(Path::new(&cfg.dataset.path), cfg.dataset.resize_to)?;
    data_doctor::check_anchor_cfg(&cfg.anchors)?;
    if let Some(s) = &cfg.score {
        score_shapes(s)?;
    }

    let (boxes, bucket) = load_dataset(cfg)?;
    if boxes.len() < cfg.kmeans.k {
        warn!("doctor: only {} boxes in bucket {} for k={}", boxes.len(), bucket.as_str(), cfg.kmeans.k);
    }

    info!("doctor: OK");
    Ok(())
}

fn cluster(cfg: &Config, k: Option<usize>, seed: Option<u64>, json: bool) -> Result<()> {
    let k = k.unwrap_or(cfg.kmeans.k);
    let seed = seed.or(cfg.kmeans.seed);
    let (boxes, bucket) = load_dataset(cfg)?;

    let mut rng = make_rng(seed);
    let out = run_kmeans(&cfg.kmeans, k, &boxes, &mut rng)?;
    if !out.converged {
        warn!("cluster: result is from the last pass before the iteration cap");
    }
    let avg_iou = average_best_iou(&boxes, &out.centroids).context("score clustering")?;
    let sizes = out.cluster_sizes();
    let anchors = anchor_params(&out.centroids, Some(sizes.as_slice()), &cfg.anchors)?;

    let report = ClusterReport {
        ts_unix_ms: now_unix_ms(),
        source: cfg.dataset.path.clone(),
        bucket: bucket.as_str().into(),
        num_boxes: boxes.len(),
        k,
        aggregator: cfg.kmeans.aggregator.clone(),
        seed,
        iterations: out.iterations,
        converged: out.converged,
        avg_iou,
        anchors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "boxes={} bucket={} k={} aggregator={} iterations={} converged={}",
            report.num_boxes, report.bucket, report.k, report.aggregator, report.iterations, report.converged
        );
        println!("avg_iou={:.4}", report.avg_iou);
        print_anchors(&report.anchors);
    }
    Ok(())
}

fn score(cfg: &Config, json: bool) -> Result<()> {
    let s = cfg.score.as_ref().context("no [score] config section")?;
    let reps = score_shapes(s)?;
    let (boxes, bucket) = load_dataset(cfg)?;

    let avg_iou = average_best_iou(&boxes, &reps).context("score anchors")?;
    let report = ScoreReport {
        ts_unix_ms: now_unix_ms(),
        source: cfg.dataset.path.clone(),
        bucket: bucket.as_str().into(),
        num_boxes: boxes.len(),
        avg_iou,
        anchors: anchor_params(&reps, None, &cfg.anchors)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("boxes={} bucket={} avg_iou={:.4}", report.num_boxes, report.bucket, report.avg_iou);
        print_anchors(&report.anchors);
    }
    Ok(())
}

fn sweep(cfg: &Config, from: usize, to: usize, seed: Option<u64>, json: bool) -> Result<()> {
    anyhow::ensure!(from >= 1 && from <= to, "sweep range must satisfy 1 <= from <= to");
    let (boxes, _) = load_dataset(cfg)?;
    let mut rng = make_rng(seed.or(cfg.kmeans.seed));

    let mut points = Vec::new();
    for k in from..=to {
        if k > boxes.len() {
            warn!("sweep: stopping at k={}, only {} boxes", k, boxes.len());
            break;
        }
        let out = run_kmeans(&cfg.kmeans, k, &boxes, &mut rng)?;
        let avg_iou = average_best_iou(&boxes, &out.centroids).context("score clustering")?;
        let p = SweepPoint { k, avg_iou, iterations: out.iterations, converged: out.converged };
        if !json {
            println!("k={} avg_iou={:.4} iterations={} converged={}", p.k, p.avg_iou, p.iterations, p.converged);
        }
        points.push(p);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&points)?);
    }
    Ok(())
}

fn load_dataset(cfg: &Config) -> Result<(Vec<BoxShape>, SizeBucket)> {
    let bucket = SizeBucket::parse(&cfg.dataset.bucket)?;
    let opts = LoadOptions { resize_to: cfg.dataset.resize_to, skip_crowd: cfg.dataset.skip_crowd };
    let all = load_boxes(Path::new(&cfg.dataset.path), &opts)?;

    let boxes = filter_bucket(&all, bucket);
    anyhow::ensure!(!boxes.is_empty(), "no boxes left in bucket {}", bucket.as_str());
    info!("dataset: {} of {} boxes in bucket {}", boxes.len(), all.len(), bucket.as_str());
    Ok((boxes, bucket))
}

fn run_kmeans(cfg: &KmeansCfg, k: usize, boxes: &[BoxShape], rng: &mut StdRng) -> Result<Clustering> {
    let kcfg = KMeansConfig::new(k)
        .with_max_iterations(cfg.max_iterations)
        .with_empty_cluster(parse_empty_cluster(&cfg.empty_cluster)?);
    let runner = KMeans::new(kcfg);

    let out = match cfg.aggregator.as_str() {
        "median" => runner.fit(boxes, rng),
        "mean" => runner.with_aggregator(Mean).fit(boxes, rng),
        other => anyhow::bail!("unknown kmeans.aggregator: {}", other),
    };
    out.with_context(|| format!("kmeans k={}", k))
}

fn parse_empty_cluster(s: &str) -> Result<EmptyClusterPolicy> {
    Ok(match s {
        "freeze" => EmptyClusterPolicy::Freeze,
        "reseed" => EmptyClusterPolicy::Reseed,
        "fail" => EmptyClusterPolicy::Fail,
        other => anyhow::bail!("unknown kmeans.empty_cluster: {}", other),
    })
}

fn score_shapes(s: &ScoreCfg) -> Result<Vec<BoxShape>> {
    anyhow::ensure!(!s.anchors.is_empty(), "score.anchors is empty");
    let reps: Vec<BoxShape> = s.anchors.iter().copied().map(BoxShape::from).collect();
    for (i, r) in reps.iter().enumerate() {
        anyhow::ensure!(r.is_valid(), "score.anchors[{}] has no area: {:?}", i, r);
    }
    Ok(reps)
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

fn now_unix_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

fn print_anchors(anchors: &[AnchorEntry]) {
    for (i, a) in anchors.iter().enumerate() {
        let members = a.members.map(|m| m.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "anchor[{}] w={:.1} h={:.1} scale={:.3} ratio={:.3} members={}",
            i, a.w, a.h, a.scale, a.ratio, members
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = include_str!("../anchors.example.toml");

    #[test]
    fn example_config_parses_with_defaults() {
        let cfg: Config = toml::from_str(EXAMPLE).unwrap();
        assert_eq!(cfg.kmeans.k, 9);
        assert_eq!(cfg.kmeans.aggregator, "median");
        assert_eq!(cfg.anchors.base_scale, 4.0);
        assert_eq!(cfg.score.unwrap().anchors.len(), 3);
    }

    #[test]
    fn minimal_config_fills_defaults() {
        let cfg: Config = toml::from_str("[dataset]\npath = \"boxes.txt\"\n[kmeans]\nk = 3\n").unwrap();
        assert_eq!(cfg.dataset.bucket, "all");
        assert!(cfg.dataset.skip_crowd);
        assert_eq!(cfg.kmeans.empty_cluster, "freeze");
        assert_eq!(cfg.kmeans.max_iterations, 300);
        assert_eq!(cfg.anchors.stride, 8.0);
        assert!(cfg.score.is_none());
    }

    #[test]
    fn unknown_modes_are_rejected() {
        assert!(parse_empty_cluster("drop").is_err());
        let kcfg = KmeansCfg {
            k: 1,
            seed: None,
            aggregator: "mode".into(),
            empty_cluster: "freeze".into(),
            max_iterations: 10,
        };
        let mut rng = make_rng(Some(1));
        assert!(run_kmeans(&kcfg, 1, &[BoxShape::new(1.0, 1.0)], &mut rng).is_err());
    }

    #[test]
    fn score_shapes_reject_zero_area() {
        let s = ScoreCfg { anchors: vec![[10.0, 10.0], [0.0, 4.0]] };
        assert!(score_shapes(&s).is_err());
    }

    #[test]
    fn end_to_end_cluster_on_box_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boxes.txt");
        std::fs::write(&path, "100,100\n100,100\n10,10\n10,10\n").unwrap();

        let toml_src = format!(
            "[dataset]\npath = {:?}\n[kmeans]\nk = 2\nseed = 4\naggregator = \"mean\"\n",
            path.display().to_string()
        );
        let cfg: Config = toml::from_str(&toml_src).unwrap();
        let (boxes, bucket) = load_dataset(&cfg).unwrap();
        assert_eq!((boxes.len(), bucket), (4, SizeBucket::All));

        let mut rng = make_rng(cfg.kmeans.seed);
        let out = run_kmeans(&cfg.kmeans, 2, &boxes, &mut rng).unwrap();
        assert!(out.converged);
        for c in &out.centroids {
            assert!(*c == BoxShape::new(100.0, 100.0) || *c == BoxShape::new(10.0, 10.0));
        }
    }
}
