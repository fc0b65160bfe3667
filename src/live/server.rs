// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 浏览器实时检测服务 (tiny_http)
//!
//! 页面在浏览器端采集摄像头, 循环 POST JPEG 到 `/api/detect`, 服务端返回已标注的 JPEG。

use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};
use tiny_http::{Header, Method, Request, Response, Server};

use super::hub::{serve_mjpeg, FrameHub, KEEPALIVE};
use crate::detection::{FrameDetector, FrameStats};

const INDEX_HTML: &str = include_str!("../../assets/live.html");
const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;
pub const DEFAULT_BIND: &str = "127.0.0.1:7860";
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Index,
    Detect,
    Model,
    Stats,
    Stream,
    NotFound,
}

impl Route {
    pub fn resolve(method: &Method, url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or("");
        match (method, path) {
            (Method::Get, "/") | (Method::Get, "/index.html") => Self::Index,
            (Method::Post, "/api/detect") => Self::Detect,
            (Method::Get, "/api/model") => Self::Model,
            (Method::Get, "/api/stats") => Self::Stats,
            (Method::Get, "/stream") => Self::Stream,
            _ => Self::NotFound,
        }
    }
}

struct Shared {
    detector: Mutex<FrameDetector>,
    hub: Arc<FrameHub>,
    model_json: String,
    jpeg_quality: u8,
}

pub struct LiveServer {
    server: Arc<Server>,
    shared: Arc<Shared>,
    addr: String,
}

impl LiveServer {
    pub fn bind(addr: &str, detector: FrameDetector, jpeg_quality: u8) -> Result<Self> {
        let server = Server::http(addr).map_err(|e| anyhow!("无法监听 {}: {}", addr, e))?;
        let model_json = model_json(&detector)?;
        Ok(Self {
            server: Arc::new(server),
            shared: Arc::new(Shared {
                detector: Mutex::new(detector),
                hub: Arc::new(FrameHub::new()),
                model_json,
                jpeg_quality,
            }),
            addr: addr.to_string(),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn hub(&self) -> Arc<FrameHub> {
        self.shared.hub.clone()
    }

    /// 启动工作线程并阻塞等待
    pub fn run(self, workers: usize) -> Result<()> {
        log::info!("🌐 实时界面: http://{}", self.addr);

        let mut handles = Vec::new();
        for i in 0..workers.max(1) {
            let server = self.server.clone();
            let shared = self.shared.clone();
            let handle = std::thread::Builder::new()
                .name(format!("http-{}", i))
                .spawn(move || loop {
                    match server.recv() {
                        Ok(req) => handle_request(req, &shared),
                        Err(e) => {
                            log::error!("❌ 接收请求失败: {}", e);
                            break;
                        }
                    }
                })
                .context("无法创建 HTTP 工作线程")?;
            handles.push(handle);
        }

        for handle in handles {
            if handle.join().is_err() {
                log::error!("❌ HTTP 工作线程异常退出");
            }
        }
        self.shared.hub.close();
        Ok(())
    }
}

fn handle_request(mut req: Request, shared: &Shared) {
    let route = Route::resolve(req.method(), req.url());
    log::debug!("{} {} → {:?}", req.method(), req.url(), route);

    let result = match route {
        Route::Index => text_response(INDEX_HTML, "text/html; charset=utf-8")
            .and_then(|resp| respond(req, resp)),
        Route::Model => text_response(&shared.model_json, "application/json")
            .and_then(|resp| respond(req, resp)),
        Route::Stats => serde_json::to_string(&shared.hub.stats())
            .context("统计序列化失败")
            .and_then(|json| text_response(&json, "application/json"))
            .and_then(|resp| respond(req, resp)),
        Route::Detect => {
            let body = read_body(&mut req);
            let resp = body.and_then(|body| detect_response(shared, &body));
            match resp {
                Ok(resp) => respond(req, resp),
                Err(e) => {
                    log::warn!("⚠️ 检测请求无效: {:#}", e);
                    respond(req, Response::from_string(format!("{:#}", e)).with_status_code(400))
                }
            }
        }
        Route::Stream => stream(req, shared.hub.clone()),
        Route::NotFound => respond(req, Response::from_string("not found").with_status_code(404)),
    };

    if let Err(e) = result {
        log::warn!("⚠️ 响应失败: {:#}", e);
    }
}

fn respond<R: Read>(req: Request, resp: Response<R>) -> Result<()> {
    req.respond(resp).context("写入响应失败")
}

/// MJPEG 推流在独立线程中直接写 socket, 不占用工作线程
fn stream(req: Request, hub: Arc<FrameHub>) -> Result<()> {
    std::thread::Builder::new()
        .name("mjpeg".to_string())
        .spawn(move || {
            let mut writer = req.into_writer();
            match serve_mjpeg(&hub, &mut writer, KEEPALIVE) {
                Ok(()) => log::info!("📴 推流结束"),
                Err(e) => log::info!("📴 MJPEG 观看端断开: {}", e),
            }
        })
        .context("无法创建推流线程")?;
    Ok(())
}

fn read_body(req: &mut Request) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    req.as_reader()
        .take(MAX_BODY_BYTES + 1)
        .read_to_end(&mut body)
        .context("读取请求体失败")?;
    if body.len() as u64 > MAX_BODY_BYTES {
        return Err(anyhow!("请求体超过 {} 字节", MAX_BODY_BYTES));
    }
    Ok(body)
}

fn detect_response(shared: &Shared, body: &[u8]) -> Result<Response<Cursor<Vec<u8>>>> {
    let (jpeg, stats) = detect_bytes(&shared.detector, body, shared.jpeg_quality)?;
    shared.hub.publish(jpeg.clone(), stats.clone());

    Ok(Response::from_data(jpeg)
        .with_header(header("Content-Type", "image/jpeg")?)
        .with_header(header("Cache-Control", "no-store")?)
        .with_header(header("X-Merch-Count", &stats.merch_count.to_string())?)
        .with_header(header("X-Inference-Ms", &format!("{:.1}", stats.inference_ms))?)
        .with_header(header("X-Fps", &format!("{:.1}", stats.fps))?))
}

/// 解码上传图片 → 检测 → 编码 JPEG
pub fn detect_bytes(
    detector: &Mutex<FrameDetector>,
    body: &[u8],
    quality: u8,
) -> Result<(Vec<u8>, FrameStats)> {
    let frame = image::load_from_memory(body)
        .context("无法解码上传的图片")?
        .to_rgb8();

    let processed = detector
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .process(frame);
    let jpeg = encode_jpeg(&processed.image, quality)?;
    Ok((jpeg, processed.stats()))
}

pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)
        .context("JPEG 编码失败")?;
    Ok(buf)
}

/// `/api/model` 响应, 模型未加载时为 `{"loaded": false}`
fn model_json(detector: &FrameDetector) -> Result<String> {
    let value = match detector.model() {
        Some(model) => {
            let mut value = serde_json::to_value(model.info())?;
            value["loaded"] = serde_json::Value::Bool(true);
            value
        }
        None => serde_json::json!({ "loaded": false }),
    };
    Ok(serde_json::to_string(&value)?)
}

fn text_response(body: &str, content_type: &str) -> Result<Response<Cursor<Vec<u8>>>> {
    Ok(Response::from_string(body).with_header(header("Content-Type", content_type)?))
}

fn header(name: &str, value: &str) -> Result<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes())
        .map_err(|_| anyhow!("非法响应头 {}: {}", name, value))
}
