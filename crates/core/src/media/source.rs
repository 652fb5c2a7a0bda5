//! Frame sources feeding the packetizer.
//!
//! A [`FrameSource`] is shared by the server and cloned into every session;
//! each session turns it into its own [`Streamer`], which hands out one
//! [`Frame`] per tick.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// One JPEG image, borrowed for the duration of a single streaming call.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub data: &'a [u8],
    /// Monotonic capture time in milliseconds (wraps at `u32::MAX`).
    pub captured_at_ms: u32,
    /// Size the source claims, `(0, 0)` if unknown. The JPEG's own SOF wins.
    pub declared_size: (u16, u16),
}

/// Hardware seam: a camera that fills a JPEG buffer on request.
///
/// The buffer returned by [`buffer`](Self::buffer) stays valid until
/// [`release`](Self::release) is called; the streamer always releases a
/// captured buffer, whatever happens to the frame.
pub trait CameraDriver: Send {
    /// Grab a frame. `Ok(false)` means none is ready yet.
    fn capture(&mut self) -> Result<bool>;

    /// The captured JPEG bytes.
    fn buffer(&self) -> &[u8];

    /// Hand the buffer back to the driver.
    fn release(&mut self);

    /// Frame size the driver is configured for, in pixels.
    fn dimensions(&self) -> (u16, u16);
}

/// A camera shared between sessions. Only one session captures at a time.
pub type SharedCamera = Arc<Mutex<Box<dyn CameraDriver>>>;

/// A fixed list of JPEG images played in a loop.
#[derive(Debug)]
pub struct CannedFrames {
    frames: Vec<Vec<u8>>,
    dimensions: (u16, u16),
}

impl CannedFrames {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Where frames come from.
#[derive(Clone)]
pub enum FrameSource {
    Camera(SharedCamera),
    Canned(Arc<CannedFrames>),
}

impl FrameSource {
    pub fn camera(driver: impl CameraDriver + 'static) -> Self {
        Self::Camera(Arc::new(Mutex::new(Box::new(driver))))
    }

    /// Loop over `frames`; `dimensions` is the declared size, `(0, 0)` if unknown.
    pub fn canned(frames: Vec<Vec<u8>>, dimensions: (u16, u16)) -> Self {
        if frames.is_empty() {
            tracing::warn!("canned frame source is empty, sessions will stream nothing");
        }
        Self::Canned(Arc::new(CannedFrames { frames, dimensions }))
    }

    /// The built-in moving-bars pattern.
    pub fn test_pattern(width: u16, height: u16) -> Self {
        let frames = super::pattern::test_pattern(width, height);
        Self::canned(frames, super::pattern::padded_size(width, height))
    }

    /// Per-session frame cursor.
    pub fn streamer(&self) -> Streamer {
        match self {
            Self::Camera(camera) => Streamer::Camera(Arc::clone(camera)),
            Self::Canned(frames) => Streamer::Canned {
                frames: Arc::clone(frames),
                next: 0,
            },
        }
    }
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Camera(_) => f.write_str("FrameSource::Camera"),
            Self::Canned(frames) => write!(f, "FrameSource::Canned({} frames)", frames.len()),
        }
    }
}

/// Releases the camera buffer when dropped.
struct FrameLease<'a> {
    driver: &'a mut dyn CameraDriver,
}

impl Drop for FrameLease<'_> {
    fn drop(&mut self) {
        self.driver.release();
    }
}

/// One session's view of a [`FrameSource`].
pub enum Streamer {
    Camera(SharedCamera),
    Canned {
        frames: Arc<CannedFrames>,
        next: usize,
    },
}

impl Streamer {
    /// Fetch the next frame and pass it to `sink`.
    ///
    /// Returns `Ok(false)` without calling `sink` when no frame is available
    /// this tick (camera busy in another session, nothing captured, or an
    /// empty list). Errors from `sink` are returned after the frame has been
    /// released.
    pub fn stream_image<F>(&mut self, now_ms: u32, sink: F) -> Result<bool>
    where
        F: FnOnce(&Frame<'_>) -> Result<()>,
    {
        match self {
            Self::Camera(camera) => {
                let Some(mut driver) = camera.try_lock() else {
                    tracing::trace!("camera busy, skipping tick");
                    return Ok(false);
                };
                if !driver.capture()? {
                    return Ok(false);
                }
                let lease = FrameLease {
                    driver: &mut **driver,
                };
                let frame = Frame {
                    data: lease.driver.buffer(),
                    captured_at_ms: now_ms,
                    declared_size: lease.driver.dimensions(),
                };
                sink(&frame)?;
                Ok(true)
            }
            Self::Canned { frames, next } => {
                let Some(data) = frames.frames.get(*next) else {
                    return Ok(false);
                };
                *next = (*next + 1) % frames.frames.len();
                sink(&Frame {
                    data,
                    captured_at_ms: now_ms,
                    declared_size: frames.dimensions,
                })?;
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RtspError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockCamera {
        frame: Vec<u8>,
        ready: bool,
        releases: Arc<AtomicUsize>,
    }

    impl CameraDriver for MockCamera {
        fn capture(&mut self) -> Result<bool> {
            Ok(self.ready)
        }

        fn buffer(&self) -> &[u8] {
            &self.frame
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }

        fn dimensions(&self) -> (u16, u16) {
            (320, 240)
        }
    }

    fn camera(ready: bool) -> (FrameSource, Arc<AtomicUsize>) {
        let releases = Arc::new(AtomicUsize::new(0));
        let source = FrameSource::camera(MockCamera {
            frame: vec![0xFF, 0xD8, 1, 2],
            ready,
            releases: Arc::clone(&releases),
        });
        (source, releases)
    }

    #[test]
    fn camera_frame_is_released() {
        let (source, releases) = camera(true);
        let mut streamer = source.streamer();
        let mut seen = Vec::new();
        let sent = streamer
            .stream_image(42, |frame| {
                seen = frame.data.to_vec();
                assert_eq!(frame.captured_at_ms, 42);
                assert_eq!(frame.declared_size, (320, 240));
                Ok(())
            })
            .unwrap();
        assert!(sent);
        assert_eq!(seen, vec![0xFF, 0xD8, 1, 2]);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn camera_released_when_frame_rejected() {
        let (source, releases) = camera(true);
        let mut streamer = source.streamer();
        let result = streamer.stream_image(0, |_| Err(RtspError::MalformedJpeg("bad")));
        assert!(matches!(result, Err(RtspError::MalformedJpeg(_))));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nothing_captured_releases_nothing() {
        let (source, releases) = camera(false);
        let mut streamer = source.streamer();
        assert!(!streamer.stream_image(0, |_| panic!("no frame expected")).unwrap());
        assert_eq!(releases.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn busy_camera_skips_tick() {
        let (source, _) = camera(true);
        let mut streamer = source.streamer();
        let FrameSource::Camera(shared) = &source else {
            unreachable!()
        };
        let _held = shared.lock();
        assert!(!streamer.stream_image(0, |_| panic!("camera is busy")).unwrap());
    }

    #[test]
    fn canned_frames_cycle() {
        let source = FrameSource::canned(vec![vec![1], vec![2], vec![3]], (0, 0));
        let mut streamer = source.streamer();
        let mut order = Vec::new();
        for _ in 0..5 {
            streamer
                .stream_image(0, |frame| {
                    order.push(frame.data[0]);
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(order, vec![1, 2, 3, 1, 2]);
    }

    #[test]
    fn sessions_have_independent_cursors() {
        let source = FrameSource::canned(vec![vec![1], vec![2]], (0, 0));
        let mut a = source.streamer();
        let mut b = source.streamer();
        a.stream_image(0, |_| Ok(())).unwrap();
        let mut first_of_b = 0;
        b.stream_image(0, |frame| {
            first_of_b = frame.data[0];
            Ok(())
        })
        .unwrap();
        assert_eq!(first_of_b, 1);
    }

    #[test]
    fn empty_canned_list_streams_nothing() {
        let mut streamer = FrameSource::canned(Vec::new(), (0, 0)).streamer();
        assert!(!streamer.stream_image(0, |_| Ok(())).unwrap());
    }

    #[test]
    fn test_pattern_dimensions() {
        let mut streamer = FrameSource::test_pattern(100, 60).streamer();
        streamer
            .stream_image(0, |frame| {
                assert_eq!(frame.declared_size, (112, 64));
                Ok(())
            })
            .unwrap();
    }
}
