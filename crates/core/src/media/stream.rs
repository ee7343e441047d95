//! The per-session streaming thread.
//!
//! Each tick of a fixed-period clock the thread pulls one frame, packetizes
//! it and sends the packets; every `rtcp_interval` it also sends a report.
//! It stops when cancelled, when the frame source runs dry, or on the first
//! transmit error. On exit it hands its [`MediaStream`] back through the
//! join handle so a later PLAY can resume where this one stopped.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::source::{FrameSource, MediaSource};
use super::{Packetizer, rtcp};
use crate::error::{Result, RtspError};
use crate::transport::MediaSink;

/// Timing of the streaming thread.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Period between frames (default 33 ms, about 30 fps).
    pub frame_interval: Duration,
    /// Period between RTCP reports (default 5 s).
    pub rtcp_interval: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(33),
            rtcp_interval: Duration::from_secs(5),
        }
    }
}

impl StreamConfig {
    /// Frame interval from a frame rate. Non-positive rates keep the default.
    pub fn with_fps(mut self, fps: f64) -> Self {
        if fps > 0.0 {
            self.frame_interval = Duration::from_secs_f64(1.0 / fps);
        }
        self
    }

    /// RTP timestamp ticks per frame: `clock_rate * frame_interval`.
    pub fn timestamp_increment(&self, clock_rate: u32) -> u32 {
        (clock_rate as u128 * self.frame_interval.as_micros() / 1_000_000) as u32
    }
}

/// Packetizer and frame source of one session.
pub struct MediaStream {
    packetizer: Box<dyn Packetizer>,
    source: Box<dyn FrameSource>,
    clock_rate: u32,
}

impl MediaStream {
    pub fn open(media: &dyn MediaSource) -> Result<Self> {
        Ok(Self {
            packetizer: media.packetizer(),
            source: media.open()?,
            clock_rate: media.format().clock_rate,
        })
    }

    pub fn packetizer(&self) -> &dyn Packetizer {
        self.packetizer.as_ref()
    }
}

/// Owner's handle to a running streaming thread.
///
/// [`stop`](Self::stop) signals the thread and joins it, so the sink and
/// its socket are released by the time it returns.
pub struct StreamHandle {
    cancel: Sender<()>,
    thread: JoinHandle<MediaStream>,
}

impl StreamHandle {
    pub fn spawn(
        session_id: &str,
        media: MediaStream,
        sink: Box<dyn MediaSink>,
        config: &StreamConfig,
    ) -> Result<Self> {
        let (cancel, cancelled) = mpsc::channel();
        let packetizer = media.packetizer();
        tracing::info!(
            session_id,
            pt = packetizer.payload_type(),
            ssrc = format_args!("{:#010X}", packetizer.ssrc()),
            seq = packetizer.next_sequence(),
            rtptime = packetizer.next_rtp_timestamp(),
            "streaming started"
        );

        let worker = Worker {
            session_id: session_id.to_string(),
            media,
            sink,
            config: config.clone(),
        };

        let thread = thread::Builder::new()
            .name(format!("rtp-{session_id}"))
            .spawn(move || worker.run(cancelled))?;

        Ok(Self { cancel, thread })
    }

    /// Whether the thread has already exited on its own.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Cancel and join. Returns the media state unless the thread panicked.
    pub fn stop(self) -> Option<MediaStream> {
        let _ = self.cancel.send(());
        match self.thread.join() {
            Ok(media) => Some(media),
            Err(_) => {
                tracing::error!("streaming thread panicked");
                None
            }
        }
    }
}

struct Worker {
    session_id: String,
    media: MediaStream,
    sink: Box<dyn MediaSink>,
    config: StreamConfig,
}

enum Exit {
    Cancelled,
    Exhausted,
    Failed(RtspError),
}

impl Worker {
    fn run(mut self, cancelled: mpsc::Receiver<()>) -> MediaStream {
        let increment = self.config.timestamp_increment(self.media.clock_rate);
        let mut sent: u64 = 0;
        let mut next_frame = Instant::now();
        let mut next_report = next_frame;

        let exit = loop {
            let wait = next_frame.saturating_duration_since(Instant::now());
            match cancelled.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break Exit::Cancelled,
            }

            let now = Instant::now();
            if now >= next_report {
                let report = rtcp::receiver_report(self.media.packetizer.ssrc());
                if let Err(e) = self.sink.send_rtcp(&report) {
                    break Exit::Failed(RtspError::TransmitFailure(e));
                }
                next_report = now + self.config.rtcp_interval;
            }

            let frame = match self.media.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break Exit::Exhausted,
                Err(e) => break Exit::Failed(e),
            };

            let packets = self.media.packetizer.packetize(&frame, increment);
            if let Some(e) = packets
                .iter()
                .find_map(|packet| self.sink.send_rtp(packet).err())
            {
                break Exit::Failed(RtspError::TransmitFailure(e));
            }
            sent += packets.len() as u64;
            next_frame += self.config.frame_interval;
        };

        let session_id = &self.session_id;
        match exit {
            Exit::Cancelled => tracing::info!(session_id, sent, "streaming stopped"),
            Exit::Exhausted => tracing::info!(session_id, sent, "media source exhausted"),
            Exit::Failed(error) => {
                tracing::warn!(session_id, sent, %error, "streaming aborted")
            }
        }

        self.media
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaFormat, MemorySource, StillImage};
    use std::io;
    use std::sync::mpsc::Receiver;

    #[derive(Debug, PartialEq)]
    enum Sent {
        Rtp(Vec<u8>),
        Rtcp(Vec<u8>),
    }

    struct ChannelSink(Sender<Sent>);

    impl MediaSink for ChannelSink {
        fn send_rtp(&mut self, packet: &[u8]) -> io::Result<()> {
            let _ = self.0.send(Sent::Rtp(packet.to_vec()));
            Ok(())
        }

        fn send_rtcp(&mut self, packet: &[u8]) -> io::Result<()> {
            let _ = self.0.send(Sent::Rtcp(packet.to_vec()));
            Ok(())
        }
    }

    struct FailingSink;

    impl MediaSink for FailingSink {
        fn send_rtp(&mut self, _: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "unreachable"))
        }

        fn send_rtcp(&mut self, _: &[u8]) -> io::Result<()> {
            Ok(())
        }
    }

    fn fast() -> StreamConfig {
        StreamConfig {
            frame_interval: Duration::from_millis(5),
            rtcp_interval: Duration::from_secs(3600),
        }
    }

    fn channel_sink() -> (Box<dyn MediaSink>, Receiver<Sent>) {
        let (tx, rx) = mpsc::channel();
        (Box::new(ChannelSink(tx)), rx)
    }

    fn seq(packet: &[u8]) -> u16 {
        u16::from_be_bytes([packet[2], packet[3]])
    }

    fn ts(packet: &[u8]) -> u32 {
        u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]])
    }

    fn rtp_only(rx: &Receiver<Sent>) -> Vec<Vec<u8>> {
        rx.try_iter()
            .filter_map(|sent| match sent {
                Sent::Rtp(p) => Some(p),
                Sent::Rtcp(_) => None,
            })
            .collect()
    }

    #[test]
    fn timestamp_increment_from_interval() {
        assert_eq!(StreamConfig::default().timestamp_increment(90_000), 2970);
        assert_eq!(
            StreamConfig::default().with_fps(30.0).timestamp_increment(90_000),
            3000
        );
    }

    #[test]
    fn finite_source_streams_every_frame_in_order() {
        let frames: Vec<Vec<u8>> = (0u8..6).map(|i| vec![i; 4]).collect();
        let source = MemorySource::new(MediaFormat::h264(), frames.clone());
        let media = MediaStream::open(&source).unwrap();
        let ssrc = media.packetizer().ssrc();
        let (sink, rx) = channel_sink();

        let handle = StreamHandle::spawn("t1", media, sink, &fast()).unwrap();
        let sent: Vec<Sent> = rx.iter().collect();
        assert!(handle.stop().is_some());

        assert_eq!(sent[0], Sent::Rtcp(rtcp::receiver_report(ssrc).to_vec()));
        let rtp: Vec<&Vec<u8>> = sent
            .iter()
            .filter_map(|s| match s {
                Sent::Rtp(p) => Some(p),
                Sent::Rtcp(_) => None,
            })
            .collect();
        assert_eq!(rtp.len(), frames.len());

        let increment = fast().timestamp_increment(90_000);
        for (i, pair) in rtp.windows(2).enumerate() {
            assert_eq!(seq(pair[1]), seq(pair[0]).wrapping_add(1));
            assert_eq!(ts(pair[1]), ts(pair[0]).wrapping_add(increment));
            assert_eq!(&pair[0][12..], frames[i].as_slice());
        }
        for packet in &rtp {
            assert_eq!(u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]), ssrc);
        }
    }

    #[test]
    fn stop_cancels_and_returns_media() {
        let source = StillImage::from_bytes(vec![1, 2, 3]);
        let (sink, rx) = channel_sink();
        let handle =
            StreamHandle::spawn("t2", MediaStream::open(&source).unwrap(), sink, &fast()).unwrap();

        thread::sleep(Duration::from_millis(40));
        assert!(!handle.is_finished());
        let media = handle.stop().expect("media returned");

        let before = rtp_only(&rx).len();
        assert!(before > 0);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(rtp_only(&rx).len(), 0, "no packets after stop");
        assert_eq!(media.packetizer().next_sequence() as usize, before);
    }

    #[test]
    fn restart_resumes_numbering() {
        let source = StillImage::from_bytes(vec![9]);
        let (sink, rx) = channel_sink();
        let handle =
            StreamHandle::spawn("t3", MediaStream::open(&source).unwrap(), sink, &fast()).unwrap();
        thread::sleep(Duration::from_millis(20));
        let media = handle.stop().unwrap();
        let first = rtp_only(&rx);

        let (sink, rx) = channel_sink();
        let handle = StreamHandle::spawn("t3", media, sink, &fast()).unwrap();
        thread::sleep(Duration::from_millis(20));
        handle.stop().unwrap();
        let second = rtp_only(&rx);

        let last = first.last().unwrap();
        assert_eq!(seq(&second[0]), seq(last).wrapping_add(1));
        assert!(ts(&second[0]) > ts(last));
    }

    #[test]
    fn transmit_failure_ends_the_thread() {
        let source = StillImage::from_bytes(vec![1]);
        let handle = StreamHandle::spawn(
            "t4",
            MediaStream::open(&source).unwrap(),
            Box::new(FailingSink),
            &fast(),
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(handle.is_finished());
        assert!(handle.stop().is_some());
    }
}
