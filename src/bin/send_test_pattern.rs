//! Test sender: streams a moving color bar pattern to a udpcam receiver
//!
//! Frames are encoded and fragmented the way the phone app does it (JPEG
//! quality 50, 1024-byte payloads) so the receiver can be exercised without
//! a phone.

use std::net::UdpSocket;
use std::thread;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;

use udpcam_lib::packetizer::{packetize, DEFAULT_MAX_PAYLOAD};
use udpcam_lib::sink::FramePacer;
use udpcam_lib::stop::{install_ctrl_c_handler, StopSignal};
use udpcam_lib::test_utils::{color_bars_image, encode_jpeg};

/// Stream a synthetic test pattern as fragmented UDP frames
#[derive(Parser, Debug)]
#[command(name = "send_test_pattern", version, about)]
struct Args {
    /// Receiver address, e.g. 127.0.0.1:8000
    #[arg(default_value = "127.0.0.1:8000")]
    target: String,

    /// Frame width in pixels
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Frame height in pixels
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Frames per second
    #[arg(long, default_value_t = 15)]
    fps: u32,

    /// Number of frames to send (0 = until interrupted)
    #[arg(long, default_value_t = 0)]
    frames: u64,

    /// JPEG quality (1-100)
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Payload bytes per datagram, excluding the 6-byte header
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
    max_payload: usize,

    /// First frame id (wraps at 65536)
    #[arg(long, default_value_t = 0)]
    start_id: u16,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").context("failed to bind sender socket")?;
    socket
        .connect(&args.target)
        .with_context(|| format!("failed to resolve {}", args.target))?;

    let stop = StopSignal::new();
    install_ctrl_c_handler(stop.clone()).context("failed to install Ctrl-C handler")?;

    log::info!(
        "Sending {}x{} @ {} fps to {} (quality {}, {} byte payloads)",
        args.width,
        args.height,
        args.fps,
        args.target,
        args.quality,
        args.max_payload
    );

    let mut pacer = FramePacer::new(args.fps);
    let mut frame_id = args.start_id;
    let mut sent = 0u64;
    let mut datagrams_sent = 0u64;

    while !stop.is_stopped() && (args.frames == 0 || sent < args.frames) {
        let offset = (sent as u32).wrapping_mul(4);
        let image = color_bars_image(args.width, args.height, offset);
        let jpeg = encode_jpeg(&image, args.quality).context("failed to encode frame")?;

        for datagram in packetize(frame_id, &jpeg, args.max_payload)? {
            socket.send(&datagram).context("failed to send datagram")?;
            datagrams_sent += 1;
        }

        pacer.mark_sent(Instant::now());
        sent += 1;
        frame_id = frame_id.wrapping_add(1);

        if sent % 100 == 0 {
            log::info!("Sent {} frames ({} datagrams)", sent, datagrams_sent);
        }

        thread::sleep(pacer.time_until_next_frame(Instant::now()));
    }

    log::info!("Done: {} frames, {} datagrams", sent, datagrams_sent);
    Ok(())
}
