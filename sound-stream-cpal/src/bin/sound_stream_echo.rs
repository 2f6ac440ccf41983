//! Loops the microphone back to the speaker through the 16-bit wire format.
//!
//! Exercises the whole pipeline on real hardware: capture → conversion to the
//! wire format → `dataPeriod` events → `write_chunk` → conversion to the
//! output format → playback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::RecvTimeoutError;

use sound_stream_core::{
    CaptureConfiguration, ChannelEventSink, PlaybackConfiguration, SoundStream, StreamEvent, DEFAULT_SAMPLE_RATE,
};
use sound_stream_cpal::{list_input_devices, list_output_devices, CpalCaptureBackend, CpalPermission, CpalPlaybackBackend};

/// Echo the microphone to the speaker for a few seconds.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// How long to run, in seconds.
    #[arg(short, long, default_value_t = 5)]
    seconds: u64,

    /// Wire sample rate in Hz.
    #[arg(short = 'r', long, default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,

    /// Input device name (default device if omitted).
    #[arg(long)]
    input: Option<String>,

    /// Output device name (default device if omitted).
    #[arg(long)]
    output: Option<String>,

    /// Print available devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// Forward engine debugPrint events to the log.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.list_devices {
        for device in list_input_devices()?.into_iter().chain(list_output_devices()?) {
            let marker = if device.is_default { "*" } else { " " };
            println!("{} {:?}\t{}", marker, device.kind, device.name);
        }
        return Ok(());
    }

    let capture = match args.input.clone() {
        Some(name) => CpalCaptureBackend::with_device(name),
        None => CpalCaptureBackend::default_device(),
    };
    let playback = match args.output.clone() {
        Some(name) => CpalPlaybackBackend::with_device(name),
        None => CpalPlaybackBackend::default_device(),
    };
    let permission = Arc::new(CpalPermission::new(args.input.clone()));

    let (sink, events) = ChannelEventSink::new(256);
    let mut stream = SoundStream::new(capture, playback, permission).with_event_sink(Arc::new(sink));

    let recorder = stream.initialize_recorder(CaptureConfiguration {
        sample_rate: args.sample_rate,
        debug_logging: args.verbose,
        ..Default::default()
    })?;
    let player = stream.initialize_player(PlaybackConfiguration {
        sample_rate: args.sample_rate,
        debug_logging: args.verbose,
        ..Default::default()
    })?;
    log::info!(
        "recorder: native {}, period {} frames; player: native {}, buffer {} frames",
        recorder.native_format,
        recorder.min_period_frames,
        player.native_format,
        player.buffer_frames
    );

    stream.start_player()?;
    stream.start_recording()?;

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match events.recv_timeout(remaining) {
            Ok(StreamEvent::DataPeriod(chunk)) => {
                if let Err(e) = stream.write_chunk(chunk.as_bytes()) {
                    log::warn!("dropped period: {}", e);
                }
            }
            Ok(StreamEvent::DebugPrint(line)) => log::info!("{}", line),
            Ok(event) => log::info!("{:?}", event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    stream.stop_recording()?;
    stream.stop_player()?;
    println!("capture:  {:?}", stream.recorder().diagnostics());
    println!("playback: {:?}", stream.player().diagnostics());
    stream.shutdown();
    Ok(())
}
