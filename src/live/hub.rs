// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 最新帧中转站
//!
//! 检测请求发布已标注的 JPEG, `/stream` 观看端按序号等待下一帧。

use std::io::{self, Write};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::detection::FrameStats;

pub const BOUNDARY: &str = "frame";
pub const KEEPALIVE: Duration = Duration::from_secs(1);

#[derive(Default)]
struct HubState {
    seq: u64,
    jpeg: Option<Arc<Vec<u8>>>,
    stats: FrameStats,
    closed: bool,
}

#[derive(Default)]
pub struct FrameHub {
    state: Mutex<HubState>,
    cond: Condvar,
}

impl FrameHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn publish(&self, jpeg: Vec<u8>, stats: FrameStats) {
        let mut state = self.lock();
        state.seq += 1;
        state.jpeg = Some(Arc::new(jpeg));
        state.stats = stats;
        self.cond.notify_all();
    }

    pub fn stats(&self) -> FrameStats {
        self.lock().stats.clone()
    }

    pub fn seq(&self) -> u64 {
        self.lock().seq
    }

    /// 等待序号大于 `after` 的帧, 超时或关闭时返回 None
    pub fn wait_next(&self, after: u64, timeout: Duration) -> Option<(u64, Arc<Vec<u8>>)> {
        let state = self.lock();
        let (state, _) = self
            .cond
            .wait_timeout_while(state, timeout, |s| s.seq <= after && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        if state.seq <= after {
            return None;
        }
        state.jpeg.clone().map(|jpeg| (state.seq, jpeg))
    }

    pub fn close(&self) {
        self.lock().closed = true;
        self.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// multipart/x-mixed-replace 的单个分段
pub fn multipart_chunk(jpeg: &[u8]) -> Vec<u8> {
    let head = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );
    let mut chunk = Vec::with_capacity(head.len() + jpeg.len() + 2);
    chunk.extend_from_slice(head.as_bytes());
    chunk.extend_from_slice(jpeg);
    chunk.extend_from_slice(b"\r\n");
    chunk
}

/// 推流响应头, 之后由 `serve_mjpeg` 逐帧写出
pub fn stream_head() -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\n\
         Cache-Control: no-cache\r\nConnection: close\r\n\r\n",
        BOUNDARY
    )
}

/// 向观看端持续写出 MJPEG, 每帧写完立即 flush
///
/// 超时未收到新帧时重发上一帧 (尚无帧时写前导空行), 断开的连接在下一次写入时报错返回。
/// 中转站关闭时返回 `Ok`。
pub fn serve_mjpeg<W: Write>(hub: &FrameHub, out: &mut W, keepalive: Duration) -> io::Result<()> {
    out.write_all(stream_head().as_bytes())?;
    out.flush()?;

    // 先推送当前帧, 观看端无需等待下一次检测
    let mut seq = hub.seq().saturating_sub(1);
    let mut last: Option<Arc<Vec<u8>>> = None;
    loop {
        match hub.wait_next(seq, keepalive) {
            Some((next, jpeg)) => {
                seq = next;
                out.write_all(&multipart_chunk(&jpeg))?;
                last = Some(jpeg);
            }
            None if hub.is_closed() => return Ok(()),
            None => match &last {
                Some(jpeg) => out.write_all(&multipart_chunk(jpeg))?,
                None => out.write_all(b"\r\n")?,
            },
        }
        out.flush()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipart_chunk() {
        let chunk = multipart_chunk(b"JPEG");
        assert_eq!(
            chunk,
            b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\n\r\nJPEG\r\n".to_vec()
        );
    }

    #[test]
    fn test_wait_next_timeout_and_publish() {
        let hub = FrameHub::new();
        assert!(hub.wait_next(0, Duration::from_millis(10)).is_none());

        hub.publish(vec![1, 2, 3], FrameStats::default());
        let (seq, jpeg) = hub.wait_next(0, Duration::from_millis(10)).unwrap();
        assert_eq!(seq, 1);
        assert_eq!(*jpeg, vec![1, 2, 3]);
        assert!(hub.wait_next(1, Duration::from_millis(10)).is_none());
    }

    /// 接收固定字节数后模拟观看端断开
    struct Viewer {
        data: Vec<u8>,
        limit: usize,
        flushes: usize,
    }

    impl Viewer {
        fn new(limit: usize) -> Self {
            Self {
                data: Vec::new(),
                limit,
                flushes: 0,
            }
        }
    }

    impl Write for Viewer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.data.len() + buf.len() > self.limit {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "viewer gone"));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_serve_sends_current_frame_then_ends_on_close() {
        let hub = FrameHub::new();
        hub.publish(b"AB".to_vec(), FrameStats::default());
        hub.close();

        let mut viewer = Viewer::new(usize::MAX);
        serve_mjpeg(&hub, &mut viewer, Duration::from_millis(10)).unwrap();

        let mut expected = stream_head().into_bytes();
        expected.extend_from_slice(&multipart_chunk(b"AB"));
        assert_eq!(viewer.data, expected);
        // 响应头与帧各 flush 一次
        assert_eq!(viewer.flushes, 2);
    }

    #[test]
    fn test_serve_detects_disconnect_without_frames() {
        let hub = FrameHub::new();
        let mut viewer = Viewer::new(stream_head().len());

        let err = serve_mjpeg(&hub, &mut viewer, Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_serve_resends_last_frame_on_timeout() {
        let hub = FrameHub::new();
        hub.publish(b"XYZ".to_vec(), FrameStats::default());

        let chunk = multipart_chunk(b"XYZ");
        let mut viewer = Viewer::new(stream_head().len() + chunk.len() * 2);
        assert!(serve_mjpeg(&hub, &mut viewer, Duration::from_millis(10)).is_err());

        let mut expected = stream_head().into_bytes();
        expected.extend_from_slice(&chunk);
        expected.extend_from_slice(&chunk);
        assert_eq!(viewer.data, expected);
    }

    #[test]
    fn test_serve_wakes_on_publish() {
        let hub = Arc::new(FrameHub::new());
        let publisher = {
            let hub = hub.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                hub.publish(b"XYZ".to_vec(), FrameStats::default());
                hub.close();
            })
        };

        let mut viewer = Viewer::new(usize::MAX);
        serve_mjpeg(&hub, &mut viewer, Duration::from_secs(5)).unwrap();
        publisher.join().unwrap();

        let mut expected = stream_head().into_bytes();
        expected.extend_from_slice(&multipart_chunk(b"XYZ"));
        assert_eq!(viewer.data, expected);
    }
}
