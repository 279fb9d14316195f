//! camrelayd - headless camera relay daemon
//!
//! This daemon:
//! 1. Connects to a camera source (TCP length-prefixed or HTTP multipart)
//! 2. Buffers compressed frames in a bounded ring (drop-to-catch-up pacing)
//! 3. Decodes, scales, and rotates frames to the output geometry
//! 4. Writes planar YUV 4:2:0 frames to a virtual camera device at a fixed
//!    cadence, re-presenting the last frame when the source stalls

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use camrelay::{
    test_pattern, FrameSink, NullSink, RelayConfig, RelaySession, TcpSource,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Camera source URL: tcp://host:port, tcp-listen://port, or
    /// http://host:port/path.
    #[arg(long)]
    source: Option<String>,
    /// Output device path, or stub:// to discard frames.
    #[arg(long)]
    device: Option<String>,
    /// Output width in pixels.
    #[arg(long)]
    width: Option<u32>,
    /// Output height in pixels.
    #[arg(long)]
    height: Option<u32>,
    /// Ring target depth (frames of buffering latency).
    #[arg(long)]
    depth: Option<usize>,
    /// Presentation rate in frames per second.
    #[arg(long)]
    fps: Option<u32>,
    /// Initial rotation in degrees (0, 90, 180, 270).
    #[arg(long)]
    rotation: Option<u32>,
    /// Present the built-in test pattern without connecting to a source.
    #[arg(long)]
    test_pattern: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = RelayConfig::load()?;
    merge_args(&mut cfg, &args);
    cfg.validate()?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            log::info!("shutdown requested");
            running.store(false, Ordering::SeqCst);
        })
        .context("install signal handler")?;
    }

    let output = cfg.output_geometry()?;
    let mut sink = open_sink(&cfg.device)?;
    sink.configure(output)
        .map_err(|e| anyhow!("configure output device: {}", e))?;

    if args.test_pattern {
        return run_test_pattern(&cfg, sink.as_mut(), &running);
    }

    let session = Arc::new(RelaySession::new(output, cfg.depth, cfg.rotation())?);
    let producer = spawn_source(&cfg, session.clone(), running.clone())?;

    let interval = Duration::from_millis((1000 / cfg.fps).max(1) as u64);
    log::info!(
        "relaying {} -> {} at {} ({} fps, depth {})",
        cfg.source,
        cfg.device,
        output,
        cfg.fps,
        cfg.depth
    );

    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        if let Err(e) = session.present_next(sink.as_mut()) {
            log::error!("session failed: {}", e);
            running.store(false, Ordering::SeqCst);
            break;
        }
        if let Some(remaining) = interval.checked_sub(started.elapsed()) {
            thread::sleep(remaining);
        }
    }

    running.store(false, Ordering::SeqCst);
    if producer.join().is_err() {
        log::error!("ingest thread panicked");
    }
    log::info!(
        "session over ({} frames dropped by pacing)",
        session.frames_dropped()
    );
    Ok(())
}

fn merge_args(cfg: &mut RelayConfig, args: &Args) {
    if let Some(source) = &args.source {
        cfg.source = source.clone();
    }
    if let Some(device) = &args.device {
        cfg.device = device.clone();
    }
    if let Some(width) = args.width {
        cfg.width = width;
    }
    if let Some(height) = args.height {
        cfg.height = height;
    }
    if let Some(depth) = args.depth {
        cfg.depth = depth;
    }
    if let Some(fps) = args.fps {
        cfg.fps = fps;
    }
    if let Some(rotation) = args.rotation {
        cfg.rotation = rotation;
    }
}

fn open_sink(device: &str) -> Result<Box<dyn FrameSink>> {
    if device.starts_with("stub://") {
        log::info!("using a null sink; frames will be counted and discarded");
        return Ok(Box::new(NullSink::new()));
    }
    #[cfg(feature = "sink-v4l2")]
    {
        Ok(Box::new(camrelay::V4l2Sink::open(device)?))
    }
    #[cfg(not(feature = "sink-v4l2"))]
    {
        bail!("writing to {} requires the sink-v4l2 feature", device)
    }
}

/// Spawns the producer thread for the configured source URL. The thread
/// clears `running` on any exit so the presentation loop follows it down.
fn spawn_source(
    cfg: &RelayConfig,
    session: Arc<RelaySession>,
    running: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>> {
    let source = cfg.source.clone();
    let output = cfg.output_geometry()?;

    if let Some(rest) = source.strip_prefix("tcp://") {
        let (host, port) = split_host_port(rest)?;
        let handle = thread::spawn(move || {
            let result = (|| {
                let mut source = TcpSource::connect(&host, port, output)?;
                let negotiated = source.handshake()?;
                session.negotiate_source(negotiated)?;
                source.run(&session, &running)
            })();
            finish_ingest(result, &running);
        });
        return Ok(handle);
    }

    if let Some(rest) = source.strip_prefix("tcp-listen://") {
        let port: u16 = rest
            .parse()
            .map_err(|_| anyhow!("tcp-listen:// needs a port, got '{}'", rest))?;
        let handle = thread::spawn(move || {
            let result = (|| {
                let mut source = TcpSource::accept(port, output, &running)?;
                let negotiated = source.handshake()?;
                session.negotiate_source(negotiated)?;
                source.run(&session, &running)
            })();
            finish_ingest(result, &running);
        });
        return Ok(handle);
    }

    if source.starts_with("http://") || source.starts_with("https://") {
        #[cfg(feature = "ingest-http")]
        {
            let handle = thread::spawn(move || {
                let result = (|| {
                    let mut source = camrelay::HttpSource::connect(&source)?;
                    source.run(&session, &running)
                })();
                finish_ingest(result, &running);
            });
            return Ok(handle);
        }
        #[cfg(not(feature = "ingest-http"))]
        {
            bail!("http sources require the ingest-http feature")
        }
    }

    bail!(
        "unsupported source '{}'; expected tcp://, tcp-listen://, or http(s)://",
        source
    )
}

fn finish_ingest(result: camrelay::Result<()>, running: &AtomicBool) {
    match result {
        Ok(()) => log::info!("ingest finished"),
        Err(e) => log::error!("ingest failed: {}", e),
    }
    running.store(false, Ordering::SeqCst);
}

fn split_host_port(rest: &str) -> Result<(String, u16)> {
    let (host, port) = rest
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("tcp:// needs host:port, got '{}'", rest))?;
    let port: u16 = port
        .parse()
        .map_err(|_| anyhow!("invalid port '{}'", port))?;
    if host.is_empty() {
        bail!("tcp:// needs a host");
    }
    Ok((host.to_string(), port))
}

/// Dry-run mode: present the built-in bars at the configured cadence.
fn run_test_pattern(cfg: &RelayConfig, sink: &mut dyn FrameSink, running: &AtomicBool) -> Result<()> {
    let output = cfg.output_geometry()?;
    let raster = test_pattern(output);
    let interval = Duration::from_millis((1000 / cfg.fps).max(1) as u64);
    log::info!("presenting test pattern at {} ({} fps)", output, cfg.fps);
    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        sink.present(raster.data())
            .map_err(|e| anyhow!("present test pattern: {}", e))?;
        if let Some(remaining) = interval.checked_sub(started.elapsed()) {
            thread::sleep(remaining);
        }
    }
    Ok(())
}
