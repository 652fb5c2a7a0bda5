use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;
use mjpeg_rtsp::{FrameSource, Server, ServerConfig, UriDescriptor};

#[derive(Parser)]
#[command(
    name = "mjpeg-rtsp-server",
    about = "Standalone RTSP server for MJPEG streams"
)]
struct Args {
    /// Bind address (host:port)
    #[arg(long, short, default_value = mjpeg_rtsp::server::DEFAULT_BIND)]
    bind: String,

    /// Host advertised in SDP and the stream URL (defaults to the address clients connect to)
    #[arg(long)]
    host: Option<String>,

    /// First path segment of the stream URL
    #[arg(long, default_value = mjpeg_rtsp::uri::DEFAULT_PRESENTATION)]
    presentation: String,

    /// Second path segment of the stream URL
    #[arg(long, default_value = mjpeg_rtsp::uri::DEFAULT_STREAM)]
    stream: String,

    /// Frames per second sent to each client
    #[arg(long, default_value_t = 10)]
    fps: u32,

    /// Largest RTP packet in bytes
    #[arg(long, default_value_t = mjpeg_rtsp::media::mjpeg::DEFAULT_MTU)]
    max_packet_size: usize,

    /// Concurrent clients before new connections are refused
    #[arg(long, default_value_t = 4)]
    max_clients: usize,

    /// Directory of .jpg/.jpeg files to loop instead of the test pattern
    #[arg(long, value_name = "DIR")]
    frames: Option<PathBuf>,

    /// Test pattern width in pixels
    #[arg(long, default_value_t = 320)]
    width: u16,

    /// Test pattern height in pixels
    #[arg(long, default_value_t = 240)]
    height: u16,
}

/// Read every JPEG in `dir`, sorted by file name.
fn load_frames(dir: &Path) -> io::Result<Vec<Vec<u8>>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        })
        .collect();
    paths.sort();
    paths.iter().map(fs::read).collect()
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let source = match &args.frames {
        Some(dir) => match load_frames(dir) {
            Ok(frames) => {
                tracing::info!(dir = %dir.display(), count = frames.len(), "loaded frames");
                FrameSource::canned(frames, (0, 0))
            }
            Err(e) => {
                eprintln!("Failed to read frames from {}: {}", dir.display(), e);
                return;
            }
        },
        None => FrameSource::test_pattern(args.width, args.height),
    };

    let mut uri = UriDescriptor::new(&args.presentation, &args.stream);
    if let Some(host) = args.host {
        uri = uri.with_host(host);
    }

    let config = ServerConfig {
        uri,
        frame_rate: args.fps,
        max_packet_size: args.max_packet_size,
        max_clients: args.max_clients,
        ..ServerConfig::default()
    };

    let mut server = Server::with_config(&args.bind, config, source);

    if let Err(e) = server.start() {
        eprintln!("Failed to start server: {}", e);
        return;
    }

    match server.stream_url() {
        Ok(url) => println!("Streaming on {} (press Enter to stop)", url),
        Err(e) => eprintln!("Server started but address is unknown: {}", e),
    }

    let mut input = String::new();
    if let Err(e) = io::stdin().read_line(&mut input) {
        eprintln!("Failed to read stdin: {}", e);
    }

    server.stop();
}
