// Message transport
//
// Multiplexes typed request/response exchanges over duplex TCP connections:
// per-message correlation ids, per-message-class dispatch, and a fixed-size
// asynchronous execution pool. One reader thread per inbound connection
// decodes frames and hands them to the single dispatch thread; interrupted
// system calls are restarted inside `read_exact`/`write_all`.
//
// Socket errors are fatal: the cluster is a closed system and there is no
// retry surface. An unknown message class on inbound dispatch is fatal too.

pub mod exec;
pub mod message;
pub mod route;

pub use message::{Meta, Request, RESPONSE_CLASS, WORKER_PULL_REQUEST, WORKER_PUSH_REQUEST};
pub use route::{NodeId, Route};

use std::collections::HashMap;
use std::io::{self, Read};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::buffer::BinaryBuffer;
use crate::error::Result;
use exec::ExecPool;

/// Runs on the execution pool when the response correlated with a send
/// arrives.
pub type ResponseCallback = Box<dyn FnOnce(Request) + Send + 'static>;

/// Inbound request handler: consumes the request, fills the pre-stamped
/// response. A handler that leaves the response content empty takes over
/// responsibility for replying later (see [`Transport::respond`]).
pub type RequestHandler = Arc<dyn Fn(Request, &mut Request) + Send + Sync + 'static>;

enum Inbound {
    Frame(Meta, Vec<u8>),
    Shutdown,
}

struct Shared {
    route: Arc<Route>,
    client_id: i32,
    nthreads: usize,
    next_message_id: AtomicU32,
    callbacks: Mutex<HashMap<u32, ResponseCallback>>,
    handlers: Mutex<HashMap<i32, RequestHandler>>,
    stopping: AtomicBool,
}

struct Threads {
    acceptor: JoinHandle<()>,
    dispatch: JoinHandle<()>,
}

pub struct Transport {
    shared: Arc<Shared>,
    threads: Mutex<Option<Threads>>,
}

impl Transport {
    pub fn new(route: Arc<Route>, nthreads: usize) -> Transport {
        assert!(nthreads > 0, "transport pool needs at least one thread");
        let client_id = route.local_id() as i32;
        Transport {
            shared: Arc::new(Shared {
                route,
                client_id,
                nthreads,
                next_message_id: AtomicU32::new(0),
                callbacks: Mutex::new(HashMap::new()),
                handlers: Mutex::new(HashMap::new()),
                stopping: AtomicBool::new(false),
            }),
            threads: Mutex::new(None),
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.shared.route.local_id()
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.shared.route
    }

    /// Install the handler for inbound requests of `message_class`.
    /// Registration completes before the receive loop starts; lookups after
    /// that point are read-only.
    pub fn register<F>(&self, message_class: i32, handler: F)
    where
        F: Fn(Request, &mut Request) + Send + Sync + 'static,
    {
        assert!(message_class >= 0, "response classes cannot take handlers");
        let mut handlers = self.shared.handlers.lock();
        let prev = handlers.insert(message_class, Arc::new(handler));
        assert!(
            prev.is_none(),
            "handler for message class {} registered twice",
            message_class
        );
    }

    /// Assign a fresh message id, stamp the local client id, register the
    /// response callback under the id, and transmit metadata and content as
    /// one atomic two-part frame.
    pub fn send(&self, mut request: Request, to: NodeId, callback: ResponseCallback) -> Result<()> {
        let message_id = self.shared.next_message_id.fetch_add(1, Ordering::Relaxed);
        request.meta.message_id = message_id;
        request.meta.client_id = self.shared.client_id;
        {
            let mut callbacks = self.shared.callbacks.lock();
            let prev = callbacks.insert(message_id, callback);
            assert!(prev.is_none(), "message id {} reused", message_id);
        }
        trace!(
            message_id,
            to,
            class = request.meta.message_class,
            "send request"
        );
        if let Err(e) = self.shared.transmit(&request, to) {
            // A failed send must not leave a dangling callback behind.
            self.shared.callbacks.lock().remove(&message_id);
            return Err(e);
        }
        Ok(())
    }

    /// Send a response assembled out of band: the deferred-reply path for a
    /// handler that withheld its response content.
    pub fn respond(&self, response: Request, to: NodeId) -> Result<()> {
        assert!(response.is_response(), "respond() takes a response message");
        self.shared.transmit(&response, to)
    }

    /// Sends still waiting for their response. Zero is a precondition of
    /// [`Transport::stop`].
    pub fn pending_responses(&self) -> usize {
        self.shared.callbacks.lock().len()
    }

    /// Bind the route's local endpoint and start the receive machinery.
    pub fn start(&self) -> Result<()> {
        let mut threads = self.threads.lock();
        assert!(threads.is_none(), "transport already started");

        let listener = TcpListener::bind(self.shared.route.local_addr())?;
        debug!(addr = %self.shared.route.local_addr(), "transport listening");
        let (tx, rx) = unbounded::<Inbound>();

        let acceptor = {
            let shared = Arc::clone(&self.shared);
            thread::Builder::new()
                .name("transport-accept".into())
                .spawn(move || loop {
                    match listener.accept() {
                        Ok((stream, peer)) => {
                            trace!(?peer, "accepted connection");
                            let shared = Arc::clone(&shared);
                            let tx = tx.clone();
                            thread::Builder::new()
                                .name("transport-read".into())
                                .spawn(move || reader_loop(shared, stream, tx))
                                .expect("failed to spawn reader thread");
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            if shared.stopping.load(Ordering::SeqCst) {
                                break;
                            }
                            panic!("listener accept failed: {}", e);
                        }
                    }
                    if shared.stopping.load(Ordering::SeqCst) {
                        break;
                    }
                })?
        };

        let dispatch = {
            let shared = Arc::clone(&self.shared);
            thread::Builder::new()
                .name("transport-dispatch".into())
                .spawn(move || {
                    let pool = ExecPool::new(shared.nthreads, "transport-exec");
                    for inbound in rx.iter() {
                        match inbound {
                            Inbound::Shutdown => break,
                            Inbound::Frame(meta, cont) => {
                                let request =
                                    Request::from_parts(meta, BinaryBuffer::from_vec(cont));
                                if request.is_response() {
                                    shared.dispatch_response(&pool, request);
                                } else {
                                    Shared::dispatch_request(&shared, &pool, request);
                                }
                            }
                        }
                    }
                    pool.shutdown();
                })?
        };

        *threads = Some(Threads { acceptor, dispatch });
        Ok(())
    }

    /// Cooperative shutdown. Requires that every send has seen its response;
    /// delivers the zero-length-metadata sentinel to the local receiver and
    /// joins the receive machinery.
    pub fn stop(&self) -> Result<()> {
        let Some(threads) = self.threads.lock().take() else {
            return Ok(());
        };
        {
            let callbacks = self.shared.callbacks.lock();
            assert!(
                callbacks.is_empty(),
                "transport stopped with {} response callbacks outstanding",
                callbacks.len()
            );
        }
        self.shared.stopping.store(true, Ordering::SeqCst);
        self.shared
            .route
            .send_frame(self.shared.route.local_id(), &0u32.to_ne_bytes())?;

        threads
            .dispatch
            .join()
            .unwrap_or_else(|_| panic!("transport dispatch thread panicked"));
        // A throwaway connection unblocks the acceptor in case the
        // sentinel's accept raced with the stop flag.
        let _ = TcpStream::connect(self.shared.route.local_addr());
        threads
            .acceptor
            .join()
            .unwrap_or_else(|_| panic!("transport acceptor thread panicked"));
        self.shared.route.close_all();
        debug!("transport stopped");
        Ok(())
    }
}

impl Shared {
    fn transmit(&self, request: &Request, to: NodeId) -> Result<()> {
        let meta = request.meta.encode();
        let mut frame = Vec::with_capacity(8 + meta.len() + request.cont.len());
        frame.extend_from_slice(&(meta.len() as u32).to_ne_bytes());
        frame.extend_from_slice(meta.as_slice());
        frame.extend_from_slice(&(request.cont.len() as u32).to_ne_bytes());
        frame.extend_from_slice(request.cont.as_slice());
        self.route.send_frame(to, &frame)
    }

    fn dispatch_request(shared: &Arc<Shared>, pool: &ExecPool, request: Request) {
        let handler = {
            let handlers = shared.handlers.lock();
            match handlers.get(&request.meta.message_class) {
                Some(handler) => Arc::clone(handler),
                None => panic!(
                    "no handler registered for message class {}",
                    request.meta.message_class
                ),
            }
        };
        let shared = Arc::clone(shared);
        pool.execute(move || {
            let mut response = Request::response_to(&request);
            let origin = request.meta.client_id;
            handler(request, &mut response);
            if response.cont.is_empty() {
                // Deferred-reply convention: the handler sends the real
                // response later.
                trace!(origin, "empty response withheld");
                return;
            }
            let to = usize::try_from(origin)
                .unwrap_or_else(|_| panic!("response for invalid client id {}", origin));
            if let Err(e) = shared.transmit(&response, to) {
                panic!("failed to send response to node {}: {}", to, e);
            }
        });
    }

    fn dispatch_response(&self, pool: &ExecPool, response: Request) {
        let message_id = response.meta.message_id;
        let callback = {
            let mut callbacks = self.callbacks.lock();
            match callbacks.remove(&message_id) {
                Some(callback) => callback,
                None => panic!("response for unknown message id {}", message_id),
            }
        };
        trace!(message_id, "response correlated");
        pool.execute(move || callback(response));
    }
}

fn reader_loop(shared: Arc<Shared>, mut stream: TcpStream, tx: Sender<Inbound>) {
    loop {
        let meta_len = match read_len(&shared, &mut stream) {
            Some(len) => len,
            None => break,
        };
        if meta_len == 0 {
            // Shutdown sentinel.
            let _ = tx.send(Inbound::Shutdown);
            break;
        }

        let mut meta_bytes = vec![0u8; meta_len];
        if !read_part(&shared, &mut stream, &mut meta_bytes) {
            break;
        }
        let meta = Meta::decode(&meta_bytes);

        let mut len_bytes = [0u8; 4];
        if !read_part(&shared, &mut stream, &mut len_bytes) {
            break;
        }
        let cont_len = u32::from_ne_bytes(len_bytes) as usize;
        let mut cont = vec![0u8; cont_len];
        if !read_part(&shared, &mut stream, &mut cont) {
            break;
        }

        if tx.send(Inbound::Frame(meta, cont)).is_err() {
            break; // dispatch already exited
        }
    }
}

/// Leading length read. EOF here is a normal connection close: the peer
/// retired its sender.
fn read_len(shared: &Shared, stream: &mut TcpStream) -> Option<usize> {
    let mut len_bytes = [0u8; 4];
    match stream.read_exact(&mut len_bytes) {
        Ok(()) => Some(u32::from_ne_bytes(len_bytes) as usize),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => None,
        Err(_) if shared.stopping.load(Ordering::SeqCst) => None,
        Err(e) => panic!("socket read failed: {}", e),
    }
}

/// Mid-frame read. A short read here is a torn frame and fatal, unless the
/// transport is already stopping.
fn read_part(shared: &Shared, stream: &mut TcpStream, buf: &mut [u8]) -> bool {
    match stream.read_exact(buf) {
        Ok(()) => true,
        Err(_) if shared.stopping.load(Ordering::SeqCst) => false,
        Err(e) => panic!("torn message frame: {}", e),
    }
}
