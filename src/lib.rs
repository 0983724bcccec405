//! `udpcam` - UDP camera stream receiver
//!
//! Reassembles JPEG/PNG frames sent as fragmented UDP datagrams and feeds
//! them, decoded and resized, to a virtual camera sink.

pub mod capture;
pub mod color_conversion;
pub mod config;
pub mod fragment_header;
pub mod frame_validation;
pub mod packetizer;
pub mod pipeline;
pub mod reassembly;
pub mod receiver;
pub mod replay;
pub mod sink;
pub mod stop;
pub mod test_utils;
pub mod transport;

use anyhow::Context;

use crate::capture::{CaptureMetadata, CaptureWriter};
use crate::config::ReceiverConfig;
use crate::pipeline::PresentPipeline;
use crate::receiver::{FrameReceiver, ReceiverStats};
use crate::replay::{CaptureReplay, ReplayConfig};
use crate::sink::{FrameSink, RawVideoSink};
use crate::stop::StopSignal;
use crate::transport::{DatagramSource, UdpTransport};

/// Run the receiver with configuration from the environment
///
/// Initializes logging, loads [`ReceiverConfig`], installs the Ctrl-C handler
/// and serves until interrupted (or until a replayed capture ends).
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the socket, sink,
/// capture or replay file cannot be opened, or if the transport fails.
pub fn run() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("udpcam {} starting up", env!("CARGO_PKG_VERSION"));

    let config = ReceiverConfig::load().context("failed to load configuration")?;
    log::debug!("Configuration: {:?}", config);

    let stop = StopSignal::new();
    stop::install_ctrl_c_handler(stop.clone()).context("failed to install Ctrl-C handler")?;

    serve(&config, &stop)?;

    log::info!("udpcam shut down");
    Ok(())
}

/// Open the sink and datagram source described by `config` and run the
/// receive loop until `stop` is raised or the source ends
///
/// # Errors
///
/// Returns an error if a resource cannot be acquired or the transport fails.
pub fn serve(config: &ReceiverConfig, stop: &StopSignal) -> anyhow::Result<ReceiverStats> {
    let sink = RawVideoSink::open(&config.output, config.sink_format())
        .context("failed to open sink")?;
    let pipeline = PresentPipeline::new(sink, config.validation);

    match &config.replay_path {
        Some(path) => {
            let replay = CaptureReplay::load_with_config(
                path,
                ReplayConfig {
                    speed: config.replay_speed,
                    loop_playback: false,
                },
            )
            .with_context(|| format!("failed to load capture {}", path.display()))?;
            receive(replay, pipeline, config, stop)
        }
        None => {
            let transport = UdpTransport::bind(&config.bind, config.poll_timeout())
                .with_context(|| format!("failed to bind {}", config.bind))?;
            receive(transport, pipeline, config, stop)
        }
    }
}

fn receive<S, K>(
    source: S,
    pipeline: PresentPipeline<K>,
    config: &ReceiverConfig,
    stop: &StopSignal,
) -> anyhow::Result<ReceiverStats>
where
    S: DatagramSource,
    K: FrameSink,
{
    let mut receiver = FrameReceiver::new(source, pipeline, config.max_datagram_size)
        .with_stats_interval(config.stats_interval);

    if let Some(path) = &config.capture_path {
        let capture = CaptureWriter::create(
            path,
            CaptureMetadata {
                bind: config.bind.clone(),
                max_datagram_size: config.max_datagram_size,
                ..Default::default()
            },
        )
        .with_context(|| format!("failed to create capture {}", path.display()))?;
        receiver = receiver.with_capture(capture);
    }

    Ok(receiver.run(stop)?)
}
