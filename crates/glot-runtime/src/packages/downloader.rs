//! Worker-pool HTTP downloader.
//!
//! Requests are queued behind a mutex and drained by a small pool of OS
//! threads; completion callbacks run on the worker that finished the
//! transfer. [`HttpDownloader::wait_for_all_requests`] is the only
//! synchronization point the rest of the runtime uses: post-batch state is
//! observed only after that barrier.

use glot_logger as logger;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

pub const HTTP_STATUS_OK: i32 = 200;

const WORKER_COUNT: usize = 4;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one request. `status` is the HTTP status, or `-1` when the
/// transfer failed before a response arrived.
pub struct DownloadResult {
    pub status: i32,
    pub content_type: String,
    pub data: Vec<u8>,
}

pub type RequestCallback = Box<dyn FnOnce(DownloadResult) + Send + 'static>;

struct Job {
    url: String,
    callback: RequestCallback,
}

struct State {
    queue: VecDeque<Job>,
    in_flight: usize,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    work_cv: Condvar,
    done_cv: Condvar,
}

pub struct HttpDownloader {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl HttpDownloader {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                in_flight: 0,
                shutdown: false,
            }),
            work_cv: Condvar::new(),
            done_cv: Condvar::new(),
        });

        let workers = (0..WORKER_COUNT)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || worker_loop(shared))
            })
            .collect();

        HttpDownloader { shared, workers }
    }

    /// Queue a GET request; the callback fires on a worker thread.
    ///
    /// Returns `false` when the downloader is already shutting down.
    pub fn create_request(&self, url: &str, callback: RequestCallback) -> bool {
        let Ok(mut state) = self.shared.state.lock() else {
            return false;
        };
        if state.shutdown {
            logger::warn(&format!(
                "Request to '{}' refused: downloader is shutting down",
                url
            ));
            return false;
        }
        state.queue.push_back(Job {
            url: url.to_string(),
            callback,
        });
        drop(state);
        self.shared.work_cv.notify_one();
        true
    }

    /// Block until the queue is empty and no request is in flight.
    pub fn wait_for_all_requests(&self) {
        let Ok(mut state) = self.shared.state.lock() else {
            return;
        };
        while !state.queue.is_empty() || state.in_flight > 0 {
            state = match self.shared.done_cv.wait(state) {
                Ok(state) => state,
                Err(_) => return,
            };
        }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HttpDownloader {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.shutdown = true;
        }
        self.shared.work_cv.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    let client = reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::blocking::Client::new());

    loop {
        let job = {
            let Ok(mut state) = shared.state.lock() else {
                return;
            };
            loop {
                if let Some(job) = state.queue.pop_front() {
                    state.in_flight += 1;
                    break job;
                }
                if state.shutdown {
                    return;
                }
                state = match shared.work_cv.wait(state) {
                    Ok(state) => state,
                    Err(_) => return,
                };
            }
        };

        let result = fetch(&client, &job.url);
        (job.callback)(result);

        if let Ok(mut state) = shared.state.lock() {
            state.in_flight -= 1;
        }
        shared.done_cv.notify_all();
    }
}

fn fetch(client: &reqwest::blocking::Client, url: &str) -> DownloadResult {
    match client.get(url).send() {
        Ok(response) => {
            let status = i32::from(response.status().as_u16());
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            match response.bytes() {
                Ok(bytes) => DownloadResult {
                    status,
                    content_type,
                    data: bytes.to_vec(),
                },
                Err(e) => {
                    logger::error(&format!("Failed reading body from '{}': {}", url, e));
                    DownloadResult {
                        status: -1,
                        content_type,
                        data: Vec::new(),
                    }
                }
            }
        }
        Err(e) => {
            logger::error(&format!("Failed downloading '{}': {}", url, e));
            DownloadResult {
                status: -1,
                content_type: String::new(),
                data: Vec::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn barrier_returns_immediately_with_no_requests() {
        let downloader = HttpDownloader::new();
        downloader.wait_for_all_requests();
    }

    #[test]
    fn downloads_complete_before_barrier_returns() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            for _ in 0..2 {
                let (mut stream, _) = listener.accept().unwrap();
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let body = b"{\"content\":{}}";
                let _ = write!(
                    stream,
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(body);
            }
        });

        static COMPLETED: AtomicUsize = AtomicUsize::new(0);
        COMPLETED.store(0, Ordering::SeqCst);

        let downloader = HttpDownloader::new();
        let url = format!("http://{}/manifest.json", addr);
        for _ in 0..2 {
            downloader.create_request(
                &url,
                Box::new(|result| {
                    assert_eq!(result.status, HTTP_STATUS_OK);
                    assert!(result.content_type.starts_with("application/json"));
                    assert_eq!(result.data, b"{\"content\":{}}");
                    COMPLETED.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        downloader.wait_for_all_requests();
        assert_eq!(COMPLETED.load(Ordering::SeqCst), 2);

        server.join().unwrap();
    }

    #[test]
    fn transport_failure_reports_negative_status() {
        glot_logger::set_severity(glot_logger::Severity::None);
        let downloader = HttpDownloader::new();
        static STATUS: AtomicUsize = AtomicUsize::new(0);
        STATUS.store(0, Ordering::SeqCst);
        // Nothing listens on this port.
        downloader.create_request(
            "http://127.0.0.1:1/nope",
            Box::new(|result| {
                assert!(result.status < 0);
                STATUS.store(1, Ordering::SeqCst);
            }),
        );
        downloader.wait_for_all_requests();
        assert_eq!(STATUS.load(Ordering::SeqCst), 1);
    }
}
