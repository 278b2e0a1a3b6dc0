use anyhow::{Context, Result};
use castify_receiver::config::{ReceiverConfig, app_name, app_version};
use castify_receiver::decoder::{DecodePipeline, DecodedPicture, FfmpegLibrary, SoftwareOnly};
use castify_receiver::demux::FrameDemuxer;
use castify_receiver::dispatch::{FrameDispatcher, PictureSink};
use castify_receiver::pipeline::{HealthMonitor, PipelineHealth};
use clap::{Arg, Command};
use log::{debug, error, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type Input = Box<dyn AsyncRead + Unpin + Send>;

/// Stands in for the display collaborator: pictures are only counted and logged.
struct LogSink {
    pictures: u64,
    started: Instant,
}

impl PictureSink for LogSink {
    fn present(&mut self, decoded: DecodedPicture) {
        self.pictures += 1;
        debug!(
            "Picture {}: {}x{} {:?}, {} bytes",
            decoded.index,
            decoded.picture.width,
            decoded.picture.height,
            decoded.picture.format,
            decoded.picture.data.len()
        );
        if self.pictures % 300 == 0 {
            let fps = self.pictures as f64 / self.started.elapsed().as_secs_f64().max(f64::EPSILON);
            info!("{} pictures decoded ({:.1} fps)", self.pictures, fps);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let matches = Command::new(app_name())
        .version(app_version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .help("Captured caster stream to receive, '-' reads stdin.")
                .default_value("-"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("JSON receiver configuration."),
        )
        .arg(
            Arg::new("chunk-size")
                .long("chunk-size")
                .value_name("BYTES")
                .help("Bytes read from the input per delivery.")
                .value_parser(clap::value_parser!(usize)),
        )
        .get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => ReceiverConfig::load(Path::new(path))?,
        None => ReceiverConfig::default(),
    };
    if let Some(chunk_size) = matches.get_one::<usize>("chunk-size") {
        config.read_chunk_size = *chunk_size;
    }

    let input: Input = match matches.get_one::<String>("input").map(String::as_str) {
        Some("-") | None => Box::new(tokio::io::stdin()),
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("cannot open {}", path))?,
        ),
    };

    run(config, input).await
}

async fn run(config: ReceiverConfig, input: Input) -> Result<()> {
    let health = Arc::new(PipelineHealth::new());
    let demuxer = Arc::new(FrameDemuxer::new().with_health(health.clone()));

    let decoder = DecodePipeline::new(FfmpegLibrary, &config.decoder, Arc::new(SoftwareOnly))
        .with_health(health.clone());
    let sink = LogSink {
        pictures: 0,
        started: Instant::now(),
    };
    let mut dispatcher = FrameDispatcher::new(demuxer.clone(), decoder, config.session, sink)
        .with_health(health.clone());

    if let Err(e) = dispatcher.decoder_mut().start() {
        if e.is_fatal() {
            return Err(e).context("cannot start the video decoder");
        }
        error!("Video decoder unavailable, video frames will be dropped: {}", e);
    }

    let input_done = CancellationToken::new();
    let delivery = tokio::spawn(deliver(
        input,
        demuxer.clone(),
        config.read_chunk_size,
        input_done.clone(),
    ));

    let (alert_tx, mut alert_rx) = mpsc::channel(16);
    let monitor = tokio::spawn(HealthMonitor::new(health.clone(), alert_tx).run());

    let mut ticker = tokio::time::interval(config.tick_interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                dispatcher.tick().context("decoder failure")?;
            }
            Some(alert) = alert_rx.recv() => {
                warn!("{}", alert);
            }
            _ = input_done.cancelled() => {
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    // frames still queued when the input ended
    while demuxer.has_completed_frame() {
        dispatcher.tick().context("decoder failure")?;
    }

    monitor.abort();
    if let Some(bytes) = finish_delivery(delivery, &input_done).await {
        info!("Input finished after {} bytes", bytes);
    }
    if demuxer.buffered_bytes() > 0 {
        warn!("{} trailing bytes did not form a frame", demuxer.buffered_bytes());
    }

    dispatcher.decoder_mut().stop();
    let session = dispatcher.session();
    info!(
        "Session: {}x{}, {} Hz, {} video frames, {} audio frames cached",
        session.width,
        session.height,
        session.audio_sample_rate,
        session.video_frame_index,
        session.audio_cache.len()
    );
    info!("{}", health.summary());
    Ok(())
}

/// Waits for the delivery task, aborting it first if the input has not ended.
///
/// Returns the bytes delivered when the input reached its end.
async fn finish_delivery(delivery: JoinHandle<Result<u64>>, ended: &CancellationToken) -> Option<u64> {
    if !ended.is_cancelled() {
        delivery.abort();
    }
    match delivery.await {
        Ok(Ok(bytes)) => Some(bytes),
        Ok(Err(e)) => {
            error!("Input failed: {:#}", e);
            None
        }
        Err(e) if e.is_cancelled() => {
            info!("Input delivery stopped before end of stream");
            None
        }
        Err(e) => {
            error!("Delivery task failed: {}", e);
            None
        }
    }
}

/// Reads the input in chunks and hands each one to the demuxer.
async fn deliver(
    mut input: Input,
    demuxer: Arc<FrameDemuxer>,
    chunk_size: usize,
    done: CancellationToken,
) -> Result<u64> {
    let _done = done.drop_guard();
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;

    loop {
        let read = input.read(&mut buffer).await.context("cannot read stream")?;
        if read == 0 {
            return Ok(total);
        }
        demuxer.add_data(&buffer[..read]);
        total += read as u64;
    }
}
