//! Static file server over plain HTTP.
//!
//! Usage: `donkey_http <doc_root> [port]` (port defaults to 80).

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use webdonkey::connection::http;
use webdonkey::coroutine::{hop, returning, Returning};
use webdonkey::executor::{Executor, ThreadPool};
use webdonkey::registry::{SharedObject, SharedRegistry};
use webdonkey::responder::StaticResponder;
use webdonkey::server::{serve_connection, AcceptResult, TcpListener};

const VERSION: &str = "webdonkey HTTP example";
const WORKER_THREADS: usize = 8;

fn serve_socket(responder: Arc<StaticResponder>, socket_or: AcceptResult) -> Returning<()> {
    returning(async move {
        let socket = match socket_or {
            Ok(socket) => socket,
            Err(cause) => {
                error!(%cause, "socket error");
                return Ok(());
            }
        };

        // Possibly switch to another pool worker before serving.
        let pool = SharedRegistry::shared().instance::<ThreadPool>();
        let exec: Arc<dyn Executor> = pool.get();
        hop(exec).await;

        let mut requests = http(socket);
        serve_connection(&mut requests, &|ctx, target| responder.respond(ctx, target), VERSION, None).await
    })
}

fn main() -> ExitCode {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let args: Vec<String> = std::env::args().collect();
    let (doc_root, port) = match args.as_slice() {
        [_, doc_root] => (doc_root.clone(), 80u16),
        [_, doc_root, port] => match port.parse() {
            Ok(port) => (doc_root.clone(), port),
            Err(_) => {
                eprintln!("Invalid port: {port}");
                return ExitCode::FAILURE;
            }
        },
        _ => {
            eprintln!("Usage: donkey_http <doc_root> [port]");
            eprintln!("Example:");
            eprintln!("    donkey_http /path/to/htdocs");
            return ExitCode::FAILURE;
        }
    };

    let shared_pool = SharedObject::new(ThreadPool::new(WORKER_THREADS));

    let responder = Arc::new(StaticResponder::new(doc_root, "index.html", VERSION));
    let endpoint = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match TcpListener::serve(endpoint, shared_pool.instance().clone(), move |socket_or| {
        serve_socket(responder.clone(), socket_or)
    }) {
        Ok(listener) => listener,
        Err(cause) => {
            error!(%cause, "failed to start the HTTP listener");
            return ExitCode::FAILURE;
        }
    };

    shared_pool.instance().join();
    drop(listener);
    ExitCode::SUCCESS
}
