//! Scripted network and session helpers shared by the integration tests.

#![allow(dead_code)]

use std::{
    io::Cursor,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use diggo_lib::{
    config::WorkerConfig,
    error::NetworkError,
    worker::{Network, Request, Response, ResponseType},
    PortalContext,
};
use tokio::sync::{mpsc, Semaphore};
use url::Url;

pub const ORIGIN: &str = "http://portal.test";

type Handler = Box<dyn Fn(&Request) -> Result<Response, NetworkError> + Send + Sync>;

struct Inner {
    handler: Mutex<Handler>,
    offline: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    calls: Mutex<Vec<String>>,
    completed: AtomicUsize,
}

/// In-process network. Every request goes through a swappable handler; the
/// default serves `200 <path>` for any URL.
#[derive(Clone)]
pub struct MockNetwork {
    inner: Arc<Inner>,
}

impl MockNetwork {
    pub fn new() -> Self {
        let handler: Handler = Box::new(|request: &Request| {
            let path = Url::parse(&request.url)
                .map(|url| url.path().to_string())
                .unwrap_or_default();
            Ok(Response::new(200).with_body(path))
        });
        Self {
            inner: Arc::new(Inner {
                handler: Mutex::new(handler),
                offline: AtomicBool::new(false),
                gate: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
                completed: AtomicUsize::new(0),
            }),
        }
    }

    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&Request) -> Result<Response, NetworkError> + Send + Sync + 'static,
    {
        *self.inner.handler.lock().unwrap() = Box::new(handler);
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Holds every fetch until [`MockNetwork::open_gate`].
    pub fn close_gate(&self) {
        *self.inner.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn open_gate(&self) {
        if let Some(gate) = self.inner.gate.lock().unwrap().take() {
            gate.add_permits(1024);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn completed(&self) -> usize {
        self.inner.completed.load(Ordering::SeqCst)
    }
}

impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        self.inner
            .calls
            .lock()
            .unwrap()
            .push(format!("{} {}", request.method.as_str(), request.url));

        let gate = self.inner.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }

        let result = if self.inner.offline.load(Ordering::SeqCst) {
            Err(NetworkError::Failed("offline".into()))
        } else {
            let handler = self.inner.handler.lock().unwrap();
            (*handler)(request)
        };
        self.inner.completed.fetch_add(1, Ordering::SeqCst);

        result.map(|response| {
            let response_type = if request.url.starts_with(ORIGIN) {
                ResponseType::Basic
            } else {
                ResponseType::Cors
            };
            response.with_url(request.url.clone()).with_type(response_type)
        })
    }
}

pub fn url(path: &str) -> String {
    format!("{ORIGIN}{path}")
}

pub fn config(precache: &[&str]) -> WorkerConfig {
    let mut config = WorkerConfig::with_origin(ORIGIN).unwrap();
    config.precache = precache.iter().map(|s| s.to_string()).collect();
    config
}

pub fn session(
    precache: &[&str],
) -> (PortalContext<MockNetwork>, MockNetwork, mpsc::UnboundedReceiver<String>) {
    let network = MockNetwork::new();
    let (context, requests) = PortalContext::in_memory(config(precache), network.clone()).unwrap();
    (context, network, requests)
}

/// A real JPEG padded with trailing bytes to exactly `size`.
pub fn jpeg_of_size(size: usize) -> Vec<u8> {
    let image = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        64,
        48,
        image::Rgb([200, 120, 40]),
    ));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
        .unwrap();
    assert!(bytes.len() <= size);
    bytes.resize(size, 0);
    bytes
}
