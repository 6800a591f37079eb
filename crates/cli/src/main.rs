use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use clap::{Parser, Subcommand};

use facetrace_core::annotate::mjpeg::{mjpeg_chunk, FramePublisher, DEFAULT_JPEG_QUALITY};
use facetrace_core::annotate::stream_annotator::StreamAnnotator;
use facetrace_core::capture::domain::frame_source::FrameSource;
use facetrace_core::capture::infrastructure::ffmpeg_frame_source::FfmpegFrameSource;
use facetrace_core::capture::infrastructure::image_sequence_source::ImageSequenceSource;
use facetrace_core::detection::domain::feature_class::FeatureClass;
use facetrace_core::detection::domain::region_detector::RegionDetector;
use facetrace_core::detection::infrastructure::model_resolver;
use facetrace_core::detection::infrastructure::onnx_face_detector::OnnxFaceDetector;
use facetrace_core::detection::infrastructure::onnx_person_detector::{
    OnnxPersonDetector, DEFAULT_CONFIDENCE as PERSON_CONFIDENCE,
};
use facetrace_core::extraction::location_provider::{
    FixedLocationProvider, HttpLocationProvider, LocationProvider,
};
use facetrace_core::extraction::record_extractor::RecordExtractor;
use facetrace_core::grouping::infrastructure::pearson_scorer::PearsonScorer;
use facetrace_core::pipeline::cluster_profiles_use_case::ClusterProfilesUseCase;
use facetrace_core::pipeline::pipeline_logger::LogPipelineLogger;
use facetrace_core::pipeline::watch_stream_use_case::{WatchConfig, WatchStreamUseCase};
use facetrace_core::shared::constants::{
    FACE_MODEL_NAME, FACE_MODEL_URL, PERSON_MODEL_NAME, PERSON_MODEL_URL, PLACEHOLDER_LOCATION,
};
use facetrace_core::store::domain::record_store::RecordStore;
use facetrace_core::store::infrastructure::json_record_store::JsonRecordStore;

/// Live face capture, record extraction, and profile clustering.
#[derive(Parser)]
#[command(name = "facetrace")]
struct Cli {
    /// Data directory for records and profiles (default: platform data dir).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch a stream and store a record per detection.
    Watch {
        /// Video source: camera device, RTSP URL, video file, or a
        /// directory of still images.
        source: String,

        /// Top-level feature class to capture: face or body.
        #[arg(long, default_value = "face")]
        top_class: String,

        /// Detection confidence threshold (0.0-1.0).
        #[arg(long, default_value = "0.5")]
        confidence: f32,

        /// Stop after this many frames (default: until the stream ends).
        #[arg(long)]
        max_frames: Option<usize>,

        /// Pass frames through without detecting or storing anything.
        #[arg(long)]
        no_detect: bool,

        /// Write the annotated stream as MJPEG multipart chunks to this
        /// file or pipe.
        #[arg(long)]
        stream_out: Option<PathBuf>,

        /// JPEG quality for --stream-out (1-100).
        #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY)]
        jpeg_quality: u8,

        /// Fixed "lat,lon" stamped on every record.
        #[arg(long)]
        location: Option<String>,

        /// URL returning the current "lat,lon" as plain text.
        #[arg(long, conflicts_with = "location")]
        location_url: Option<String>,
    },

    /// Group unassigned records into profiles by face similarity.
    Cluster {
        /// Similarity threshold; records join a profile when their score
        /// exceeds it.
        #[arg(long, default_value = "0.85")]
        threshold: f64,

        /// Discard existing profiles and recluster everything.
        #[arg(long)]
        reset: bool,
    },

    /// List profiles and their record counts.
    Profiles,

    /// Delete stored data.
    Clear {
        /// Remove profiles only, keeping the records.
        #[arg(long)]
        assignments_only: bool,
    },
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let store = Arc::new(JsonRecordStore::open(&data_dir(cli.data_dir.as_deref())?)?);

    match cli.command {
        Command::Watch {
            source,
            top_class,
            confidence,
            max_frames,
            no_detect,
            stream_out,
            jpeg_quality,
            location,
            location_url,
        } => {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(format!("Confidence must be between 0.0 and 1.0, got {confidence}").into());
            }
            if jpeg_quality == 0 || jpeg_quality > 100 {
                return Err(format!("JPEG quality must be between 1 and 100, got {jpeg_quality}").into());
            }
            let top_class: FeatureClass = top_class.parse()?;
            if top_class != FeatureClass::Face && top_class != FeatureClass::Body {
                return Err(format!("Top-level class must be face or body, got {}", top_class.name()).into());
            }

            run_watch(WatchArgs {
                store,
                source,
                top_class,
                confidence,
                max_frames,
                no_detect,
                stream_out,
                jpeg_quality,
                location,
                location_url,
            })
        }
        Command::Cluster { threshold, reset } => {
            if !(-1.0..=1.0).contains(&threshold) {
                return Err(format!("Threshold must be between -1.0 and 1.0, got {threshold}").into());
            }
            run_cluster(store, threshold, reset)
        }
        Command::Profiles => run_profiles(store),
        Command::Clear { assignments_only } => run_clear(store, assignments_only),
    }
}

struct WatchArgs {
    store: Arc<JsonRecordStore>,
    source: String,
    top_class: FeatureClass,
    confidence: f32,
    max_frames: Option<usize>,
    no_detect: bool,
    stream_out: Option<PathBuf>,
    jpeg_quality: u8,
    location: Option<String>,
    location_url: Option<String>,
}

fn run_watch(args: WatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let top_detector = build_top_detector(args.top_class, args.confidence)?;
    let part_detector = build_face_detector(args.confidence)?;

    let location: Box<dyn LocationProvider> = match (args.location, args.location_url) {
        (Some(fixed), _) => Box::new(FixedLocationProvider::new(fixed)),
        (None, Some(url)) => Box::new(HttpLocationProvider::new(url)),
        (None, None) => Box::new(FixedLocationProvider::new(PLACEHOLDER_LOCATION)),
    };

    let extractor = RecordExtractor::new(part_detector, args.store.clone(), location);

    let (publisher, writer) = match args.stream_out {
        Some(path) => {
            let (publisher, rx) = FramePublisher::channel();
            let quality = args.jpeg_quality;
            let handle = thread::spawn(move || write_mjpeg(&path, rx, quality));
            (Some(publisher), Some(handle))
        }
        None => (None, None),
    };

    let config = WatchConfig {
        top_class: args.top_class,
        min_confidence: args.confidence,
        detection_enabled: Arc::new(AtomicBool::new(!args.no_detect)),
        stop: Arc::new(AtomicBool::new(false)),
        max_frames: args.max_frames,
    };

    let mut use_case = WatchStreamUseCase::new(
        open_source(&args.source),
        top_detector,
        extractor,
        StreamAnnotator::new(),
        publisher,
        Box::new(LogPipelineLogger::default()),
    );
    let report = use_case.execute(&args.source, &config)?;
    drop(use_case); // releases the publisher so the writer thread ends

    if let Some(handle) = writer {
        if handle.join().is_err() {
            log::warn!("Stream writer thread panicked");
        }
    }

    println!(
        "{} frames read, {} records created",
        report.frames_read, report.records_created
    );
    Ok(())
}

fn run_cluster(
    store: Arc<JsonRecordStore>,
    threshold: f64,
    reset: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if reset {
        let removed = store.clear_profiles()?;
        log::info!("Cleared {removed} existing profiles");
    }

    let use_case = ClusterProfilesUseCase::new(store, Box::new(PearsonScorer::new()));
    let report = use_case.execute(threshold)?;
    println!(
        "{} records clustered into {} new profiles",
        report.records_assigned, report.profiles_created
    );
    Ok(())
}

fn run_profiles(store: Arc<JsonRecordStore>) -> Result<(), Box<dyn std::error::Error>> {
    let profiles = store.list_profiles()?;
    if profiles.is_empty() {
        println!("No profiles. Run `facetrace cluster` first.");
        return Ok(());
    }
    for profile in &profiles {
        let records = store.list_by_profile(&profile.id)?;
        let location = records
            .iter()
            .filter_map(|r| r.location.as_deref())
            .next_back()
            .unwrap_or("unknown");
        println!(
            "{}: {} records, last seen near {}",
            profile.name,
            records.len(),
            location
        );
    }
    let unassigned = store.list_unassigned()?.len();
    if unassigned > 0 {
        println!("({unassigned} records not yet assigned)");
    }
    Ok(())
}

fn run_clear(
    store: Arc<JsonRecordStore>,
    assignments_only: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if assignments_only {
        let removed = store.clear_profiles()?;
        println!("Removed {removed} profiles; records kept");
    } else {
        let removed = store.delete_all()?;
        println!("Removed {removed} records and all profiles");
    }
    Ok(())
}

/// Image directories become an image-sequence source; everything else goes
/// through ffmpeg.
fn open_source(source: &str) -> Box<dyn FrameSource> {
    if Path::new(source).is_dir() {
        Box::new(ImageSequenceSource::new())
    } else {
        Box::new(FfmpegFrameSource::new())
    }
}

fn build_top_detector(
    top_class: FeatureClass,
    confidence: f32,
) -> Result<Box<dyn RegionDetector>, Box<dyn std::error::Error>> {
    match top_class {
        FeatureClass::Body => {
            log::info!("Resolving model: {PERSON_MODEL_NAME}");
            let path = model_resolver::resolve(
                PERSON_MODEL_NAME,
                PERSON_MODEL_URL,
                None,
                Some(Box::new(download_progress)),
            )?;
            eprintln!();
            Ok(Box::new(OnnxPersonDetector::new(
                &path,
                confidence.max(PERSON_CONFIDENCE),
            )?))
        }
        _ => build_face_detector(confidence),
    }
}

fn build_face_detector(
    confidence: f32,
) -> Result<Box<dyn RegionDetector>, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {FACE_MODEL_NAME}");
    let path = model_resolver::resolve(
        FACE_MODEL_NAME,
        FACE_MODEL_URL,
        None,
        Some(Box::new(download_progress)),
    )?;
    eprintln!();
    Ok(Box::new(OnnxFaceDetector::new(&path, confidence)?))
}

fn data_dir(flag: Option<&Path>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(dir) = flag {
        return Ok(dir.to_path_buf());
    }
    dirs::data_dir()
        .map(|d| d.join("facetrace"))
        .ok_or_else(|| "could not determine data directory; pass --data-dir".into())
}

/// Drain published frames into an MJPEG chunk stream until the publisher
/// is dropped or the sink stops accepting writes.
fn write_mjpeg(
    path: &Path,
    rx: crossbeam_channel::Receiver<facetrace_core::shared::frame::Frame>,
    quality: u8,
) {
    let mut sink = match File::create(path) {
        Ok(file) => file,
        Err(e) => {
            log::error!("Cannot open stream output {}: {e}", path.display());
            return;
        }
    };

    for frame in rx.iter() {
        match mjpeg_chunk(&frame, quality) {
            Ok(chunk) => {
                if sink.write_all(&chunk).is_err() {
                    log::warn!("Stream output closed, stopping writer");
                    return;
                }
            }
            Err(e) => log::warn!("Skipping frame {}: {e}", frame.index()),
        }
    }
    let _ = sink.flush();
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading detection model... {pct}%");
    } else {
        eprint!("\rDownloading detection model... {downloaded} bytes");
    }
}
