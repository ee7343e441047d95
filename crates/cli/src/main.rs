use clap::{Parser, ValueEnum};
use rtspd::media::{ChunkedFile, ImageSequence, MediaSource, StillImage, StreamConfig};
use rtspd::{Server, ServerConfig};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    /// Directory → sequence, .jpg/.jpeg → image, anything else → video
    Auto,
    /// One JPEG repeated as every frame
    Image,
    /// Directory of JPEG frames, sent in name order
    Sequence,
    /// Opaque file sent in fixed-size chunks
    Video,
}

#[derive(Parser)]
#[command(name = "rtspd", about = "Standalone RTSP server streaming a media file")]
struct Args {
    /// Bind address (host:port)
    #[arg(long, short, default_value = "0.0.0.0:554")]
    bind: String,

    /// Media file or directory to stream
    #[arg(long, short)]
    media: PathBuf,

    /// How to interpret --media
    #[arg(long, value_enum, default_value_t = Kind::Auto)]
    kind: Kind,

    /// Frames per second
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Bytes per frame for --kind video
    #[arg(long, default_value_t = rtspd::media::source::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Restart an image sequence after its last frame
    #[arg(long = "loop")]
    looping: bool,

    /// Host advertised in SDP (defaults to the connection's local address)
    #[arg(long)]
    public_host: Option<String>,

    /// Port advertised in the SDP media line
    #[arg(long, default_value_t = 5004)]
    media_port: u16,

    /// Close silent control connections after this many seconds
    #[arg(long)]
    idle_timeout: Option<u64>,
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
}

fn open_media(args: &Args) -> rtspd::Result<Arc<dyn MediaSource>> {
    let kind = match args.kind {
        Kind::Auto if args.media.is_dir() => Kind::Sequence,
        Kind::Auto if is_jpeg(&args.media) => Kind::Image,
        Kind::Auto => Kind::Video,
        kind => kind,
    };
    tracing::debug!(?kind, path = %args.media.display(), "opening media");

    Ok(match kind {
        Kind::Image => Arc::new(StillImage::open(&args.media)?),
        Kind::Sequence => Arc::new(ImageSequence::from_dir(&args.media)?.looping(args.looping)),
        Kind::Video | Kind::Auto => Arc::new(ChunkedFile::new(&args.media, args.chunk_size)?),
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let media = match open_media(&args) {
        Ok(media) => media,
        Err(e) => {
            eprintln!("Failed to open media: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let config = ServerConfig {
        public_host: args.public_host.clone(),
        media_port: args.media_port,
        stream: StreamConfig::default().with_fps(args.fps),
        idle_timeout: args.idle_timeout.map(Duration::from_secs),
        ..ServerConfig::default()
    };

    let mut server = Server::with_config(&args.bind, media, config);

    if let Err(e) = server.start() {
        eprintln!("Failed to start server: {}", e);
        return ExitCode::FAILURE;
    }

    println!("RTSP server on {}, press Enter to stop", args.bind);
    let mut input = String::new();
    let _ = io::stdin().read_line(&mut input);

    server.stop();
    ExitCode::SUCCESS
}
